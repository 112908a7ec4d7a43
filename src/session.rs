//! Session builder and runtime.
//!
//! A [`Session`] wires the pipeline for one role around one channel, runs
//! every stage as its own task, and returns either the first fatal error or
//! a [`SessionReport`].
//!
//! # Example
//!
//! ```ignore
//! use framewire::{Endpoint, Session, SyntheticSource, PixelFormat};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let endpoint: Endpoint = "tcp://127.0.0.1:50051".parse()?;
//!     let session = Session::builder()
//!         .queue_capacity(20)
//!         .deadline(std::time::Duration::from_secs(30))
//!         .build();
//!
//!     let source = SyntheticSource::new(480, 640, PixelFormat::Bgra8).limit(300);
//!     let report = session
//!         .initiate(&endpoint, source, |frame| tracing::info!(rows = frame.rows(), "frame"))
//!         .await?;
//!     println!("{} fps", report.fps);
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};

use crate::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::error::{FramewireError, Result};
use crate::media::{FrameSink, FrameSource};
use crate::pipeline::{InboundPump, OutboundPump, ProcessingStage, Processor, RenderStage, SourceFeeder};
use crate::queue::{bounded_queue, DEFAULT_QUEUE_CAPACITY};
use crate::report::SessionReport;
use crate::supervisor::{CancelHandle, Supervisor};
use crate::transport::{Endpoint, MessageReader, MessageWriter, DEFAULT_READ_BUFFER_SIZE};

/// Which end of the channel this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Produces frames and renders what comes back.
    Initiator,
    /// Processes frames and sends them back.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of each inter-stage queue.
    pub queue_capacity: usize,
    /// Fail with `DeadlineExceeded` if the session runs longer than this.
    pub deadline: Option<Duration>,
    /// Largest frame a peer may announce.
    pub max_frame_bytes: usize,
    /// Socket read buffer size for stream channels.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            deadline: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity of each inter-stage queue.
    ///
    /// Default: 20. Values below 1 are raised to 1.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Set an overall session deadline.
    ///
    /// Default: none
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = Some(deadline);
        self
    }

    /// Set the largest frame a peer may announce.
    ///
    /// Default: 64 MB
    pub fn max_frame_bytes(mut self, limit: usize) -> Self {
        self.config.max_frame_bytes = limit;
        self
    }

    /// Set the socket read buffer size.
    ///
    /// Default: 64 KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size.max(1);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn build(self) -> Session {
        Session::new(self.config)
    }
}

/// One session over one channel. Consumed by running it.
pub struct Session {
    config: SessionConfig,
    supervisor: Arc<Supervisor>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(mut config: SessionConfig) -> Self {
        config.queue_capacity = config.queue_capacity.max(1);
        Self {
            config,
            supervisor: Supervisor::new(),
        }
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle that cancels this session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.supervisor.cancel_handle()
    }

    /// Connect to `endpoint` and run as Initiator.
    ///
    /// The deadline and the cancel handle already cover the connect.
    pub async fn initiate<S, K>(self, endpoint: &Endpoint, source: S, sink: K) -> Result<SessionReport>
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let started = self.start(Role::Initiator);
        let mut shutdown = self.supervisor.signal();

        let connected = tokio::select! {
            biased;
            _ = shutdown.triggered() => None,
            connected = endpoint.connect() => Some(connected),
        };

        match connected {
            Some(Ok(connection)) => {
                tracing::debug!(%endpoint, "Connected");
                let (reader, writer) = connection.into_channel(self.config.read_buffer_size);
                self.spawn_initiator(started, reader, writer, source, sink).await
            }
            Some(Err(e)) => {
                self.supervisor.fail(e);
                self.finish(Role::Initiator, started, JoinSet::new()).await
            }
            // The supervisor already holds the reason.
            None => self.finish(Role::Initiator, started, JoinSet::new()).await,
        }
    }

    /// Run as Initiator over an established channel.
    ///
    /// Frames from `source` go out in order; frames coming back go to
    /// `sink` in arrival order. Ends cleanly when the source is exhausted
    /// and the Responder has half-closed.
    pub async fn run_initiator<R, W, S, K>(
        self,
        reader: R,
        writer: W,
        source: S,
        sink: K,
    ) -> Result<SessionReport>
    where
        R: MessageReader + 'static,
        W: MessageWriter + 'static,
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let started = self.start(Role::Initiator);
        self.spawn_initiator(started, reader, writer, source, sink).await
    }

    async fn spawn_initiator<R, W, S, K>(
        self,
        started: (Instant, Option<JoinHandle<()>>),
        reader: R,
        writer: W,
        source: S,
        sink: K,
    ) -> Result<SessionReport>
    where
        R: MessageReader + 'static,
        W: MessageWriter + 'static,
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let supervisor = &self.supervisor;
        let capacity = self.config.queue_capacity;

        let (out_tx, out_rx) = bounded_queue(capacity, supervisor.signal());
        let (in_tx, in_rx) = bounded_queue(capacity, supervisor.signal());

        let mut stages = JoinSet::new();
        spawn_stage(
            &mut stages,
            supervisor,
            "source",
            SourceFeeder::new(source, out_tx, supervisor.clone()).run(),
        );
        spawn_stage(
            &mut stages,
            supervisor,
            "outbound",
            OutboundPump::new(writer, out_rx, supervisor.clone()).run(),
        );
        spawn_stage(
            &mut stages,
            supervisor,
            "inbound",
            InboundPump::new(reader, in_tx, supervisor.clone(), self.config.max_frame_bytes).run(),
        );
        spawn_stage(
            &mut stages,
            supervisor,
            "render",
            RenderStage::new(in_rx, sink, supervisor.clone()).run(),
        );

        self.finish(Role::Initiator, started, stages).await
    }

    /// Run as Responder over an established channel.
    ///
    /// Every inbound frame goes through `processor` and back out in arrival
    /// order. Ends cleanly once the Initiator half-closes and everything
    /// accepted has been sent back.
    pub async fn run_responder<R, W>(self, reader: R, writer: W, processor: Processor) -> Result<SessionReport>
    where
        R: MessageReader + 'static,
        W: MessageWriter + 'static,
    {
        let started = self.start(Role::Responder);
        let supervisor = &self.supervisor;
        let capacity = self.config.queue_capacity;
        tracing::debug!(processor = processor.name(), "Responder pipeline");

        let (in_tx, in_rx) = bounded_queue(capacity, supervisor.signal());
        let (out_tx, out_rx) = bounded_queue(capacity, supervisor.signal());

        let mut stages = JoinSet::new();
        spawn_stage(
            &mut stages,
            supervisor,
            "inbound",
            InboundPump::new(reader, in_tx, supervisor.clone(), self.config.max_frame_bytes).run(),
        );
        spawn_stage(
            &mut stages,
            supervisor,
            "processing",
            ProcessingStage::new(in_rx, processor, out_tx, supervisor.clone()).run(),
        );
        spawn_stage(
            &mut stages,
            supervisor,
            "outbound",
            OutboundPump::new(writer, out_rx, supervisor.clone()).run(),
        );

        self.finish(Role::Responder, started, stages).await
    }

    fn start(&self, role: Role) -> (Instant, Option<JoinHandle<()>>) {
        tracing::info!(
            %role,
            queue_capacity = self.config.queue_capacity,
            deadline_ms = self.config.deadline.map(|d| d.as_millis() as u64),
            "Session starting"
        );
        let timer = self.config.deadline.map(|d| self.supervisor.arm_deadline(d));
        (Instant::now(), timer)
    }

    /// Wait for every stage, then settle the outcome.
    async fn finish(
        self,
        role: Role,
        (started, timer): (Instant, Option<JoinHandle<()>>),
        mut stages: JoinSet<()>,
    ) -> Result<SessionReport> {
        while let Some(joined) = stages.join_next().await {
            if let Err(e) = joined {
                self.supervisor
                    .fail(FramewireError::StagePanicked(e.to_string()));
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let elapsed = started.elapsed();
        let stats = self.supervisor.stats().snapshot();

        match self.supervisor.take_error() {
            Some(err) => {
                tracing::info!(
                    %role,
                    elapsed_ms = elapsed.as_millis() as u64,
                    frames_sent = stats.frames_sent,
                    frames_received = stats.frames_received,
                    "Session ended with error: {}",
                    err
                );
                Err(err)
            }
            None => {
                let report = SessionReport::new(role, elapsed, stats);
                tracing::info!(
                    %role,
                    elapsed_ms = report.elapsed_ms,
                    frames_sent = stats.frames_sent,
                    frames_received = stats.frames_received,
                    frames_dropped = stats.frames_dropped,
                    fps = report.fps,
                    "Session finished"
                );
                Ok(report)
            }
        }
    }
}

/// Run one stage as its own task.
///
/// A panic is recorded while the stage still owns its queue handles, so
/// neighbouring stages see teardown rather than a closed queue.
fn spawn_stage<F>(stages: &mut JoinSet<()>, supervisor: &Arc<Supervisor>, name: &'static str, stage: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let supervisor = supervisor.clone();
    stages.spawn(async move {
        let mut stage = std::pin::pin!(AssertUnwindSafe(stage).catch_unwind());
        if let Err(payload) = stage.as_mut().await {
            supervisor.fail(FramewireError::StagePanicked(format!(
                "{}: {}",
                name,
                panic_message(&*payload)
            )));
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "panic"
    }
}
