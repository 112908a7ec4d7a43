//! Responder server.
//!
//! Accepts connections in a loop and runs one Responder session per
//! connection. A session's failure is logged as that session's status and
//! never stops the accept loop.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinSet;

use crate::error::Result;
use crate::pipeline::Processor;
use crate::session::{Session, SessionConfig};
use crate::supervisor::CancelHandle;
use crate::transport::{Connection, Endpoint, Listener};

pub struct Server {
    listener: Listener,
    config: SessionConfig,
    processor: Processor,
    next_id: AtomicU64,
}

impl Server {
    /// Bind a server that applies `processor` to every session's frames.
    pub async fn bind(endpoint: &Endpoint, config: SessionConfig, processor: Processor) -> Result<Self> {
        let listener = Listener::bind(endpoint).await?;
        Ok(Self {
            listener,
            config,
            processor,
            next_id: AtomicU64::new(1),
        })
    }

    /// The bound endpoint (with the real port when bound to port 0).
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        self.listener.local_endpoint()
    }

    /// Serve until an accept fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then cancel and await live sessions.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut sessions = JoinSet::new();
        let mut cancels = Vec::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Server shutting down");
                    break Ok(());
                }
                accepted = self.listener.accept() => {
                    let connection = match accepted {
                        Ok(connection) => connection,
                        Err(e) => break Err(e),
                    };
                    let session = Session::new(self.config.clone());
                    cancels.retain(|cancel: &CancelHandle| !cancel.is_finished());
                    cancels.push(session.cancel_handle());
                    sessions.spawn(self.handle(session, connection));
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Session task failed: {}", e);
                    }
                }
            }
        };

        for cancel in &cancels {
            cancel.cancel();
        }
        while sessions.join_next().await.is_some() {}
        result
    }

    fn handle(&self, session: Session, connection: Connection) -> impl Future<Output = ()> + Send + 'static {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let processor = self.processor.clone();
        let (reader, writer) = connection.into_channel(session.config().read_buffer_size);

        async move {
            tracing::info!(session = id, "Session accepted");
            match session.run_responder(reader, writer, processor).await {
                Ok(report) => tracing::info!(
                    session = id,
                    frames = report.stats.frames_sent,
                    dropped = report.stats.frames_dropped,
                    "Session completed"
                ),
                Err(e) => tracing::warn!(session = id, "Session failed: {}", e),
            }
        }
    }
}
