//! InboundPump - channel to frames.
//!
//! Sole reader of the channel. Reassembles messages into frames and pushes
//! each complete frame onto the inbound queue. A clean half-close on a frame
//! boundary closes the queue; anything else is a session failure.

use std::sync::Arc;

use crate::codec::Reassembler;
use crate::error::{FramewireError, Result};
use crate::protocol::Frame;
use crate::queue::QueueSender;
use crate::supervisor::{ShutdownSignal, Supervisor};
use crate::transport::MessageReader;

pub struct InboundPump<R> {
    reader: R,
    reassembler: Reassembler,
    output: QueueSender<Frame>,
    shutdown: ShutdownSignal,
    supervisor: Arc<Supervisor>,
}

impl<R: MessageReader> InboundPump<R> {
    pub fn new(
        reader: R,
        output: QueueSender<Frame>,
        supervisor: Arc<Supervisor>,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            reader,
            reassembler: Reassembler::with_max_frame_bytes(max_frame_bytes),
            output,
            shutdown: supervisor.signal(),
            supervisor,
        }
    }

    /// Pump until end of input, failure or teardown.
    pub async fn run(mut self) {
        if let Err(e) = self.pump().await {
            // Reported while the queue is still open, so the consumer sees
            // teardown rather than a clean close.
            self.supervisor.fail(e);
        }
    }

    async fn pump(&mut self) -> Result<()> {
        let stats = self.supervisor.stats();

        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return Err(FramewireError::Cancelled),
                message = self.reader.recv() => message?,
            };

            let Some(message) = message else {
                self.reassembler.finish()?;
                tracing::debug!("Inbound stream ended");
                return Ok(());
            };

            stats.record_received_message(message.header().body_length as usize);

            if let Some(frame) = self.reassembler.push(message)? {
                stats.record_received_frame();
                tracing::debug!(
                    rows = frame.rows(),
                    cols = frame.cols(),
                    format = ?frame.pixel_format(),
                    "Frame received"
                );
                self.output.push(frame).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;
    use crate::protocol::{PixelFormat, WireMessage};
    use crate::queue::bounded_queue;
    use crate::transport::{BoxFuture, MessageWriter, StreamReader, StreamWriter};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::duplex;

    fn spawn_pump(
        supervisor: &Arc<Supervisor>,
    ) -> (
        StreamWriter<tokio::io::DuplexStream>,
        crate::queue::QueueReceiver<Frame>,
        tokio::task::JoinHandle<()>,
    ) {
        let (near, far) = duplex(8 * 1024);
        let (tx, rx) = bounded_queue(4, supervisor.signal());
        let pump = InboundPump::new(StreamReader::new(far), tx, supervisor.clone(), 1 << 20);
        (StreamWriter::new(near), rx, tokio::spawn(pump.run()))
    }

    #[tokio::test]
    async fn test_frames_in_order_then_close() {
        let supervisor = Supervisor::new();
        let (mut writer, mut rx, task) = spawn_pump(&supervisor);

        let first = Frame::new(1, 1500, PixelFormat::Gray8, vec![7u8; 1500]).unwrap();
        let second = Frame::zeroed(0, 0, PixelFormat::Bgra8).unwrap();
        for frame in [&first, &second] {
            let messages: Vec<_> = encode_frame(frame).collect();
            writer.send_batch(&messages).await.unwrap();
        }
        writer.half_close().await.unwrap();

        assert_eq!(rx.pop().await.unwrap(), Some(first));
        assert_eq!(rx.pop().await.unwrap(), Some(second));
        assert_eq!(rx.pop().await.unwrap(), None);
        task.await.unwrap();

        assert!(supervisor.take_error().is_none());
        let stats = supervisor.stats().snapshot();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.messages_received, 4);
        assert_eq!(stats.bytes_received, 1500 + 2 * 9);
    }

    #[tokio::test]
    async fn test_orphan_chunk_fails_session() {
        let supervisor = Supervisor::new();
        let (mut writer, mut rx, task) = spawn_pump(&supervisor);

        writer
            .send(WireMessage::DataChunk(Bytes::from_static(b"orphan")))
            .await
            .unwrap();
        task.await.unwrap();

        assert!(matches!(rx.pop().await, Err(FramewireError::Cancelled)));
        assert!(matches!(
            supervisor.take_error(),
            Some(FramewireError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn test_half_close_mid_frame_is_truncation() {
        let supervisor = Supervisor::new();
        let (mut writer, _rx, task) = spawn_pump(&supervisor);

        let frame = Frame::zeroed(1, 3000, PixelFormat::Gray8).unwrap();
        let messages: Vec<_> = encode_frame(&frame).take(2).collect();
        writer.send_batch(&messages).await.unwrap();
        writer.half_close().await.unwrap();
        task.await.unwrap();

        assert!(matches!(
            supervisor.take_error(),
            Some(FramewireError::TruncatedStream {
                received: 1024,
                expected: 3000
            })
        ));
    }

    /// Fails every read with a reset connection.
    struct BrokenReader {
        reads: Arc<AtomicUsize>,
    }

    impl MessageReader for BrokenReader {
        fn recv(&mut self) -> BoxFuture<'_, Result<Option<WireMessage>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Err(FramewireError::Channel(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )))
            })
        }
    }

    #[tokio::test]
    async fn test_read_error_stops_pump_once() {
        let supervisor = Supervisor::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = bounded_queue(4, supervisor.signal());
        let reader = BrokenReader {
            reads: reads.clone(),
        };

        InboundPump::new(reader, tx, supervisor.clone(), 1 << 20)
            .run()
            .await;

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(matches!(rx.pop().await, Err(FramewireError::Cancelled)));
        match supervisor.take_error() {
            Some(FramewireError::Channel(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset)
            }
            other => panic!("expected channel error, got {:?}", other),
        }
        assert!(supervisor.take_error().is_none());
        assert_eq!(supervisor.stats().snapshot().frames_dropped, 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_input() {
        let supervisor = Supervisor::new();
        let (_writer, _rx, task) = spawn_pump(&supervisor);

        tokio::task::yield_now().await;
        supervisor.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("pump should stop")
            .unwrap();
        assert!(matches!(
            supervisor.take_error(),
            Some(FramewireError::Cancelled)
        ));
    }
}
