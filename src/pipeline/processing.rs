//! Processing stages between the queues and the edges of the pipeline.
//!
//! - [`ProcessingStage`] - Responder: inbound queue -> [`Processor`] -> outbound queue
//! - [`SourceFeeder`] - Initiator: FrameSource -> outbound queue
//! - [`RenderStage`] - Initiator: inbound queue -> FrameSink
//!
//! Frame-local failures (detector errors, unsupported formats) drop the one
//! frame and the stage moves on. Everything else ends the session.

use std::fmt;
use std::sync::Arc;

use crate::detect::Detector;
use crate::error::{FramewireError, Result};
use crate::media::{FrameSink, FrameSource};
use crate::protocol::Frame;
use crate::queue::{QueueReceiver, QueueSender};
use crate::supervisor::{ShutdownSignal, Supervisor};

/// The per-frame transform applied by a processing stage.
#[derive(Clone)]
pub enum Processor {
    /// Forward frames unchanged.
    PassThrough,
    /// Run a detector on each frame, on the blocking thread pool.
    DetectAndAnnotate(Arc<dyn Detector>),
}

impl Processor {
    pub fn detect(detector: impl Detector) -> Self {
        Processor::DetectAndAnnotate(Arc::new(detector))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Processor::PassThrough => "pass-through",
            Processor::DetectAndAnnotate(_) => "detect-and-annotate",
        }
    }

    /// Transform one frame.
    ///
    /// # Errors
    ///
    /// - `UnsupportedFormat` if the frame is not in the detector's format
    /// - whatever the detector returns
    /// - `StagePanicked` if the detector panicked
    pub async fn process(&self, frame: Frame) -> Result<Frame> {
        match self {
            Processor::PassThrough => Ok(frame),
            Processor::DetectAndAnnotate(detector) => {
                let expected = detector.expected_format();
                if frame.pixel_format() != expected {
                    return Err(FramewireError::UnsupportedFormat {
                        expected,
                        actual: frame.pixel_format(),
                    });
                }

                let detector = Arc::clone(detector);
                tokio::task::spawn_blocking(move || detector.detect_and_annotate(frame))
                    .await
                    .map_err(|e| FramewireError::StagePanicked(format!("detector: {}", e)))?
            }
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies a [`Processor`] to every frame between two queues.
pub struct ProcessingStage {
    input: QueueReceiver<Frame>,
    output: QueueSender<Frame>,
    processor: Processor,
    supervisor: Arc<Supervisor>,
}

impl ProcessingStage {
    pub fn new(
        input: QueueReceiver<Frame>,
        processor: Processor,
        output: QueueSender<Frame>,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        Self {
            input,
            output,
            processor,
            supervisor,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.pump().await {
            self.supervisor.fail(e);
        }
    }

    async fn pump(&mut self) -> Result<()> {
        let mut sequence: u64 = 0;

        while let Some(frame) = self.input.pop().await? {
            sequence += 1;
            match self.processor.process(frame).await {
                Ok(frame) => {
                    self.supervisor.stats().record_processed();
                    self.output.push(frame).await?;
                }
                Err(e) if e.is_frame_local() => {
                    tracing::debug!(sequence, processor = self.processor.name(), "Frame rejected");
                    self.supervisor.fail(e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(frames = sequence, "Processing input drained");
        Ok(())
    }
}

/// Pulls frames from a [`FrameSource`] into the outbound queue.
///
/// End of input closes the queue.
pub struct SourceFeeder<S> {
    source: S,
    output: QueueSender<Frame>,
    shutdown: ShutdownSignal,
    supervisor: Arc<Supervisor>,
}

impl<S: FrameSource> SourceFeeder<S> {
    pub fn new(source: S, output: QueueSender<Frame>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            source,
            output,
            shutdown: supervisor.signal(),
            supervisor,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.pump().await {
            self.supervisor.fail(e);
        }
    }

    async fn pump(&mut self) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return Err(FramewireError::Cancelled),
                next = self.source.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => self.output.push(frame).await?,
                Ok(None) => {
                    tracing::debug!("Frame source exhausted");
                    return Ok(());
                }
                Err(e @ FramewireError::Source(_)) => return Err(e),
                Err(e) => return Err(FramewireError::Source(e.to_string())),
            }
        }
    }
}

/// Hands frames from the inbound queue to a [`FrameSink`].
pub struct RenderStage<K> {
    input: QueueReceiver<Frame>,
    sink: K,
    supervisor: Arc<Supervisor>,
}

impl<K: FrameSink> RenderStage<K> {
    pub fn new(input: QueueReceiver<Frame>, sink: K, supervisor: Arc<Supervisor>) -> Self {
        Self {
            input,
            sink,
            supervisor,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.pump().await {
            self.supervisor.fail(e);
        }
    }

    async fn pump(&mut self) -> Result<()> {
        while let Some(frame) = self.input.pop().await? {
            self.sink.accept(frame);
            self.supervisor.stats().record_processed();
        }
        Ok(())
    }
}
