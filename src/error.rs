//! Error types for framewire.

use thiserror::Error;

use crate::protocol::PixelFormat;

/// Main error type for all framewire operations.
#[derive(Debug, Error)]
pub enum FramewireError {
    /// Read or write failure on the transport channel.
    #[error("Channel error: {0}")]
    Channel(#[from] std::io::Error),

    /// Protocol violation on the wire (bad message, out-of-order chunk, etc.).
    #[error("Framing error: {0}")]
    Framing(String),

    /// Peer half-closed while a frame was still being accumulated.
    #[error("Stream truncated: received {received} of {expected} frame bytes")]
    TruncatedStream { received: usize, expected: usize },

    /// The detector failed on a single frame.
    #[error("Detector error: {0}")]
    Detector(String),

    /// The detector was handed a frame in a layout it was not configured for.
    #[error("Unsupported pixel format: expected {expected:?}, got {actual:?}")]
    UnsupportedFormat {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    /// The frame source failed.
    #[error("Frame source error: {0}")]
    Source(String),

    /// A frame was built with a buffer that does not match its dimensions.
    #[error("Invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    /// The session was cancelled.
    #[error("Session cancelled")]
    Cancelled,

    /// The session deadline passed.
    #[error("Session deadline exceeded")]
    DeadlineExceeded,

    /// The other end of a pipeline queue is gone.
    #[error("Queue closed")]
    QueueClosed,

    /// A pipeline task panicked.
    #[error("Stage {0} panicked")]
    StagePanicked(String),

    /// Endpoint string could not be parsed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// JSON serialization error (session report only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FramewireError {
    /// Whether this error only affects the frame that caused it.
    ///
    /// Frame-local errors drop that frame and the pipeline keeps going;
    /// everything else ends the session.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            FramewireError::Detector(_) | FramewireError::UnsupportedFormat { .. }
        )
    }
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;
