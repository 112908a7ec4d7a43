//! OutboundPump - frames to channel.
//!
//! Sole writer of the channel. Encodes each frame and writes its messages in
//! batches; all of one frame goes out before any of the next. When the
//! outbound queue closes, the channel is half-closed so the peer sees end of
//! input. Half-close is also attempted after a failure.

use std::sync::Arc;
use std::time::Duration;

use crate::codec::encode_frame;
use crate::error::{FramewireError, Result};
use crate::protocol::{Frame, WireMessage};
use crate::queue::QueueReceiver;
use crate::supervisor::{ShutdownSignal, Supervisor};
use crate::transport::MessageWriter;

/// Maximum messages handed to the writer in one call (64 KB of chunks).
const MAX_BATCH_MESSAGES: usize = 64;

/// Upper bound on the best-effort half-close after a failure.
const HALF_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct OutboundPump<W> {
    writer: W,
    input: QueueReceiver<Frame>,
    shutdown: ShutdownSignal,
    supervisor: Arc<Supervisor>,
}

impl<W: MessageWriter> OutboundPump<W> {
    pub fn new(writer: W, input: QueueReceiver<Frame>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            writer,
            input,
            shutdown: supervisor.signal(),
            supervisor,
        }
    }

    /// Pump until the queue closes, failure or teardown, then half-close.
    pub async fn run(mut self) {
        match self.pump().await {
            Ok(()) => match self.writer.half_close().await {
                Ok(()) => tracing::debug!("Outbound stream half-closed"),
                Err(e) => self.supervisor.fail(e),
            },
            Err(e) => {
                self.supervisor.fail(e);
                match tokio::time::timeout(HALF_CLOSE_TIMEOUT, self.writer.half_close()).await {
                    Ok(Ok(())) => tracing::debug!("Outbound stream half-closed after failure"),
                    Ok(Err(e)) => tracing::debug!("Half-close after failure: {}", e),
                    Err(_) => tracing::debug!("Half-close after failure timed out"),
                }
            }
        }
    }

    async fn pump(&mut self) -> Result<()> {
        let stats = self.supervisor.stats();

        while let Some(frame) = self.input.pop().await? {
            let messages: Vec<WireMessage> = encode_frame(&frame).collect();

            for batch in messages.chunks(MAX_BATCH_MESSAGES) {
                tokio::select! {
                    biased;
                    _ = self.shutdown.triggered() => return Err(FramewireError::Cancelled),
                    sent = self.writer.send_batch(batch) => sent?,
                }

                let bytes = batch
                    .iter()
                    .map(|m| m.header().body_length as usize)
                    .sum();
                stats.record_sent_messages(batch.len(), bytes);
            }

            stats.record_sent_frame();
            tracing::debug!(
                rows = frame.rows(),
                cols = frame.cols(),
                messages = messages.len(),
                "Frame sent"
            );
        }

        Ok(())
    }
}
