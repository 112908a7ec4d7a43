//! Integration tests for framewire.
//!
//! Initiator and Responder sessions run against each other over in-memory
//! duplex streams and real sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framewire::codec::encode_frame;
use framewire::detect::DEFAULT_COLOR;
use framewire::protocol::{Metadata, WireMessage, CHUNK_SIZE};
use framewire::transport::{BoxFuture, MessageReader, MessageWriter, StreamReader, StreamWriter};
use framewire::{
    Detector, Frame, FrameSource, FramewireError, IterSource, Listener, PixelFormat, Processor,
    Result, Server, Session, SessionConfig, SyntheticSource, ThresholdDetector,
};
use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

type Reader = StreamReader<ReadHalf<DuplexStream>>;
type Writer = StreamWriter<WriteHalf<DuplexStream>>;

/// Two connected channel ends.
fn channel_pair() -> ((Reader, Writer), (Reader, Writer)) {
    let (a, b) = duplex(64 * 1024);
    let (ar, aw) = split(a);
    let (br, bw) = split(b);
    (
        (StreamReader::new(ar), StreamWriter::new(aw)),
        (StreamReader::new(br), StreamWriter::new(bw)),
    )
}

/// Gray frame whose first byte carries `index`.
fn numbered(index: u8, rows: u32, cols: u32) -> Frame {
    let len = (rows * cols) as usize;
    let mut data: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
    if let Some(first) = data.first_mut() {
        *first = index;
    }
    Frame::new(rows, cols, PixelFormat::Gray8, data).unwrap()
}

fn collecting_sink() -> (Arc<Mutex<Vec<Frame>>>, impl FnMut(Frame) + Send + 'static) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink_frames = frames.clone();
    (frames, move |frame: Frame| sink_frames.lock().unwrap().push(frame))
}

/// Never yields a frame.
struct StalledSource;

impl FrameSource for StalledSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>>> {
        Box::pin(std::future::pending())
    }
}

/// Fails on the frame whose first byte is `fail_on`; counts calls.
struct FailOn {
    fail_on: u8,
    calls: Arc<AtomicUsize>,
}

impl Detector for FailOn {
    fn expected_format(&self) -> PixelFormat {
        PixelFormat::Gray8
    }

    fn detect_and_annotate(&self, frame: Frame) -> Result<Frame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if frame.data().first() == Some(&self.fail_on) {
            return Err(FramewireError::Detector("no regions".into()));
        }
        Ok(frame)
    }
}

#[tokio::test]
async fn test_loopback_preserves_order_and_bytes() {
    let shapes = [
        (0, 0),
        (1, 1),
        (1, CHUNK_SIZE as u32),
        (2, CHUNK_SIZE as u32),
        (3, 1000),
        (16, 64),
    ];
    let frames: Vec<Frame> = (0..60u8)
        .map(|i| {
            let (rows, cols) = shapes[i as usize % shapes.len()];
            numbered(i, rows, cols)
        })
        .collect();

    let ((i_reader, i_writer), (r_reader, r_writer)) = channel_pair();
    let (received, sink) = collecting_sink();

    // Small queues so backpressure is exercised end to end.
    let initiator = Session::builder().queue_capacity(2).build();
    let responder = Session::builder().queue_capacity(2).build();

    let (initiator_report, responder_report) = tokio::join!(
        initiator.run_initiator(i_reader, i_writer, IterSource::from_frames(frames.clone()), sink),
        responder.run_responder(r_reader, r_writer, Processor::PassThrough),
    );

    let initiator_report = initiator_report.unwrap();
    let responder_report = responder_report.unwrap();

    assert_eq!(*received.lock().unwrap(), frames);
    assert_eq!(initiator_report.stats.frames_sent, 60);
    assert_eq!(initiator_report.stats.frames_received, 60);
    assert_eq!(initiator_report.stats.frames_processed, 60);
    assert_eq!(responder_report.stats.frames_received, 60);
    assert_eq!(responder_report.stats.frames_sent, 60);
    assert_eq!(
        initiator_report.stats.bytes_sent,
        responder_report.stats.bytes_received
    );
}

#[tokio::test]
async fn test_detector_failure_drops_exactly_that_frame() {
    let frames: Vec<Frame> = (0..8u8).map(|i| numbered(i, 4, 300)).collect();
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = FailOn {
        fail_on: 3,
        calls: calls.clone(),
    };

    let ((i_reader, i_writer), (r_reader, r_writer)) = channel_pair();
    let (received, sink) = collecting_sink();

    let (initiator_report, responder_report) = tokio::join!(
        Session::builder().build().run_initiator(
            i_reader,
            i_writer,
            IterSource::from_frames(frames.clone()),
            sink
        ),
        Session::builder()
            .build()
            .run_responder(r_reader, r_writer, Processor::detect(detector)),
    );

    initiator_report.unwrap();
    let responder_report = responder_report.unwrap();

    let indices: Vec<u8> = received.lock().unwrap().iter().map(|f| f.data()[0]).collect();
    assert_eq!(indices, vec![0, 1, 2, 4, 5, 6, 7]);
    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(responder_report.stats.frames_dropped, 1);
    assert_eq!(responder_report.stats.frames_sent, 7);
}

#[tokio::test]
async fn test_unsupported_format_frames_are_dropped() {
    let frames = vec![Frame::zeroed(2, 2, PixelFormat::Gray8).unwrap(); 3];
    let detector = ThresholdDetector::new(PixelFormat::Bgra8, 200);

    let ((i_reader, i_writer), (r_reader, r_writer)) = channel_pair();
    let (received, sink) = collecting_sink();

    let (initiator_report, responder_report) = tokio::join!(
        Session::builder().build().run_initiator(
            i_reader,
            i_writer,
            IterSource::from_frames(frames),
            sink
        ),
        Session::builder()
            .build()
            .run_responder(r_reader, r_writer, Processor::detect(detector)),
    );

    assert_eq!(initiator_report.unwrap().stats.frames_received, 0);
    assert_eq!(responder_report.unwrap().stats.frames_dropped, 3);
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_while_every_stage_is_blocked() {
    let ((i_reader, i_writer), _peer) = channel_pair();
    let (_received, sink) = collecting_sink();

    let session = Session::builder().build();
    let cancel = session.cancel_handle();
    let run = tokio::spawn(session.run_initiator(i_reader, i_writer, StalledSource, sink));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("cancellation should end every stage")
        .unwrap();
    assert!(matches!(result, Err(FramewireError::Cancelled)));
}

#[tokio::test]
async fn test_zero_capacity_config_runs() {
    let config = SessionConfig {
        queue_capacity: 0,
        ..SessionConfig::default()
    };
    let frames: Vec<Frame> = (0..10u8).map(|i| numbered(i, 4, 700)).collect();

    let ((i_reader, i_writer), (r_reader, r_writer)) = channel_pair();
    let (received, sink) = collecting_sink();

    let (initiator_report, responder_report) = tokio::join!(
        Session::new(config.clone()).run_initiator(
            i_reader,
            i_writer,
            IterSource::from_frames(frames.clone()),
            sink
        ),
        Session::new(config).run_responder(r_reader, r_writer, Processor::PassThrough),
    );

    initiator_report.unwrap();
    responder_report.unwrap();
    assert_eq!(*received.lock().unwrap(), frames);
}

#[tokio::test]
async fn test_sink_panic_reported_as_stage_panic() {
    let frames: Vec<Frame> = (0..3u8).map(|i| numbered(i, 2, 2)).collect();
    let ((i_reader, i_writer), (r_reader, r_writer)) = channel_pair();
    let sink = |frame: Frame| {
        if frame.rows() > 0 {
            panic!("sink exploded");
        }
    };

    let (initiator_result, _responder_result) = tokio::join!(
        Session::builder().deadline(Duration::from_secs(5)).build().run_initiator(
            i_reader,
            i_writer,
            IterSource::from_frames(frames),
            sink
        ),
        Session::builder()
            .deadline(Duration::from_secs(5))
            .build()
            .run_responder(r_reader, r_writer, Processor::PassThrough),
    );

    match initiator_result {
        Err(FramewireError::StagePanicked(message)) => {
            assert!(message.contains("render"), "{}", message);
            assert!(message.contains("sink exploded"), "{}", message);
        }
        other => panic!("expected stage panic, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_before_connect() {
    let listener = Listener::bind(&"tcp://127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let endpoint = listener.local_endpoint().unwrap();

    let session = Session::builder().build();
    session.cancel_handle().cancel();
    let (_received, sink) = collecting_sink();

    let result = session.initiate(&endpoint, StalledSource, sink).await;
    assert!(matches!(result, Err(FramewireError::Cancelled)));

    let accepted = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
    assert!(accepted.is_err(), "no connection expected");
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let ((i_reader, i_writer), _peer) = channel_pair();
    let (_received, sink) = collecting_sink();

    let result = Session::builder()
        .deadline(Duration::from_millis(100))
        .build()
        .run_initiator(i_reader, i_writer, StalledSource, sink)
        .await;

    assert!(matches!(result, Err(FramewireError::DeadlineExceeded)));
}

#[tokio::test]
async fn test_chunk_without_metadata_is_framing_error() {
    let ((mut peer_reader, mut peer_writer), (r_reader, r_writer)) = channel_pair();
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = FailOn {
        fail_on: 0xFF,
        calls: calls.clone(),
    };

    let responder = tokio::spawn(
        Session::builder()
            .deadline(Duration::from_secs(5))
            .build()
            .run_responder(r_reader, r_writer, Processor::detect(detector)),
    );

    peer_writer
        .send(WireMessage::DataChunk(bytes::Bytes::from_static(b"stray pixels")))
        .await
        .unwrap();

    let result = responder.await.unwrap();
    assert!(matches!(result, Err(FramewireError::Framing(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Nothing came back, and the responder half-closed its side.
    assert!(peer_reader.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_half_close_mid_frame_is_truncation() {
    let ((_peer_reader, mut peer_writer), (r_reader, r_writer)) = channel_pair();

    let responder = tokio::spawn(
        Session::builder()
            .build()
            .run_responder(r_reader, r_writer, Processor::PassThrough),
    );

    let frame = numbered(1, 3, 1000);
    let partial: Vec<WireMessage> = encode_frame(&frame).take(2).collect();
    peer_writer.send_batch(&partial).await.unwrap();
    peer_writer.half_close().await.unwrap();

    let result = responder.await.unwrap();
    assert!(matches!(
        result,
        Err(FramewireError::TruncatedStream {
            received: 1024,
            expected: 3000
        })
    ));
}

#[tokio::test]
async fn test_metadata_mid_frame_is_framing_error() {
    let ((_peer_reader, mut peer_writer), (r_reader, r_writer)) = channel_pair();

    let responder = tokio::spawn(
        Session::builder()
            .build()
            .run_responder(r_reader, r_writer, Processor::PassThrough),
    );

    let metadata = WireMessage::Metadata(Metadata::new(1, 2048, PixelFormat::Gray8));
    let chunk = WireMessage::DataChunk(bytes::Bytes::from(vec![0u8; 100]));
    peer_writer
        .send_batch(&[metadata.clone(), chunk, metadata])
        .await
        .unwrap();

    let result = responder.await.unwrap();
    assert!(matches!(result, Err(FramewireError::Framing(_))));
}

#[tokio::test]
async fn test_tcp_server_annotates_frames() {
    let detector = ThresholdDetector::new(PixelFormat::Bgra8, 200);
    let server = Server::bind(
        &"tcp://127.0.0.1:0".parse().unwrap(),
        SessionConfig::default(),
        Processor::detect(detector),
    )
    .await
    .unwrap();
    let endpoint = server.local_endpoint().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async {
        let _ = stop_rx.await;
    }));

    let (received, sink) = collecting_sink();
    let source = SyntheticSource::new(32, 48, PixelFormat::Bgra8).limit(5);
    let report = Session::builder()
        .deadline(Duration::from_secs(10))
        .build()
        .initiate(&endpoint, source, sink)
        .await
        .unwrap();

    assert_eq!(report.stats.frames_sent, 5);
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 5);
    for frame in received.iter() {
        assert_eq!(frame.pixel_format(), PixelFormat::Bgra8);
        let outlined = frame
            .data()
            .chunks_exact(4)
            .any(|pixel| pixel[..3] == DEFAULT_COLOR);
        assert!(outlined, "every frame should carry an outline");
    }

    let _ = stop_tx.send(());
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_server_survives_failed_session() {
    let server = Server::bind(
        &"tcp://127.0.0.1:0".parse().unwrap(),
        SessionConfig::default(),
        Processor::PassThrough,
    )
    .await
    .unwrap();
    let endpoint = server.local_endpoint().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async {
        let _ = stop_rx.await;
    }));

    // A client that breaks the protocol.
    {
        let connection = endpoint.connect().await.unwrap();
        let (mut reader, mut writer) = connection.into_channel(4096);
        writer
            .send(WireMessage::DataChunk(bytes::Bytes::from_static(b"junk")))
            .await
            .unwrap();
        assert!(reader.recv().await.unwrap().is_none());
    }

    // The next client is served normally.
    let (received, sink) = collecting_sink();
    let frames: Vec<Frame> = (0..3u8).map(|i| numbered(i, 2, 2)).collect();
    Session::builder()
        .build()
        .initiate(&endpoint, IterSource::from_frames(frames.clone()), sink)
        .await
        .unwrap();
    assert_eq!(*received.lock().unwrap(), frames);

    let _ = stop_tx.send(());
    serving.await.unwrap().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_loopback() {
    let path = framewire::transport::generate_socket_path();
    let endpoint = framewire::Endpoint::Unix(path.clone());

    let server = Server::bind(&endpoint, SessionConfig::default(), Processor::PassThrough)
        .await
        .unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async {
        let _ = stop_rx.await;
    }));

    let (received, sink) = collecting_sink();
    let frames: Vec<Frame> = (0..4u8).map(|i| numbered(i, 8, 512)).collect();
    Session::builder()
        .build()
        .initiate(&endpoint, IterSource::from_frames(frames.clone()), sink)
        .await
        .unwrap();
    assert_eq!(*received.lock().unwrap(), frames);

    let _ = stop_tx.send(());
    serving.await.unwrap().unwrap();
    assert!(!path.exists());
}
