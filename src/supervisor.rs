//! Session supervisor - first-error-wins, exactly-once teardown.
//!
//! Every pipeline stage reports failures here. The supervisor keeps the
//! first session-fatal error, flips a `watch` shutdown signal that every
//! blocking queue and channel operation races against, and never runs the
//! teardown twice no matter how many stages fail at once.
//!
//! ```text
//! InboundPump ──┐
//! Processing  ──┼─► fail(err) ─► first-error slot ─► shutdown signal ─► all stages
//! OutboundPump ─┤
//! deadline    ──┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::FramewireError;
use crate::report::SessionStats;

/// Receiving side of the shutdown signal.
///
/// Each stage holds its own clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check without waiting.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once teardown has started.
    ///
    /// Also resolves if the supervisor is gone, since no session is left to
    /// run.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

/// Single authority for session teardown.
#[derive(Debug)]
pub struct Supervisor {
    shutdown: watch::Sender<bool>,
    first_error: Mutex<Option<FramewireError>>,
    torn_down: AtomicBool,
    stats: SessionStats,
}

impl Supervisor {
    pub fn new() -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            shutdown,
            first_error: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            stats: SessionStats::default(),
        })
    }

    /// A fresh receiver for the shutdown signal.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown.subscribe(),
        }
    }

    /// Report a stage failure.
    ///
    /// Frame-local errors are counted and logged; the frame is already gone
    /// and the session continues. Anything else is recorded if it is the
    /// first, then the session is torn down.
    pub fn fail(&self, err: FramewireError) {
        if err.is_frame_local() {
            let dropped = self.stats.record_dropped();
            tracing::warn!(total_dropped = dropped, "Dropping frame: {}", err);
            return;
        }

        match self.first_error.lock() {
            Ok(mut slot) if slot.is_none() => {
                tracing::error!("Session failed: {}", err);
                *slot = Some(err);
            }
            _ => tracing::debug!("Ignoring error after teardown: {}", err),
        }

        self.teardown();
    }

    /// Cancel the session.
    pub fn cancel(&self) {
        self.fail(FramewireError::Cancelled);
    }

    /// Signal every stage to stop. Runs at most once.
    fn teardown(&self) {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!("Tearing down session");
            self.shutdown.send_replace(true);
        }
    }

    /// Whether teardown has started.
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Remove and return the recorded error.
    pub fn take_error(&self) -> Option<FramewireError> {
        self.first_error.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Fail the session with `DeadlineExceeded` after `deadline`.
    ///
    /// The timer task ends early once teardown starts for any other reason.
    pub fn arm_deadline(self: &Arc<Self>, deadline: Duration) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        let mut signal = self.signal();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.triggered() => {}
                _ = tokio::time::sleep(deadline) => {
                    supervisor.fail(FramewireError::DeadlineExceeded);
                }
            }
        })
    }

    /// Handle that can cancel this session from outside.
    pub fn cancel_handle(self: &Arc<Self>) -> CancelHandle {
        CancelHandle {
            supervisor: Arc::downgrade(self),
        }
    }
}

/// Cancels a running session. Cheap to clone.
///
/// Holds a weak reference, so an outstanding handle never keeps a finished
/// session alive.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    supervisor: Weak<Supervisor>,
}

impl CancelHandle {
    /// Request cancellation. No-op if the session already ended.
    pub fn cancel(&self) {
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.cancel();
        }
    }

    /// Whether the session is gone.
    pub fn is_finished(&self) -> bool {
        self.supervisor.strong_count() == 0
    }
}
