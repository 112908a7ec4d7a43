//! # framewire
//!
//! Bidirectional streaming of raw image frames between an **Initiator** and a
//! remote **Responder** over one byte-stream channel.
//!
//! The Initiator streams frames out; the Responder runs a detector on each
//! one, outlines what it found, and streams the annotated frame back. Both
//! ends run the same three-stage pipeline (InboundPump, processing,
//! OutboundPump) joined by bounded queues, under a supervisor that keeps the
//! first fatal error and tears the session down exactly once.
//!
//! ## Wire format
//!
//! Each frame travels as one `Metadata` message (rows, cols, pixel format)
//! followed by its pixel bytes in `DataChunk`s of at most 1024 bytes. Every
//! message carries a 5-byte header: `[kind:u8][body_length:u32 BE]`.
//!
//! ## Example
//!
//! ```ignore
//! use framewire::{Endpoint, PixelFormat, Processor, Server, SessionConfig, ThresholdDetector};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let endpoint: Endpoint = "tcp://0.0.0.0:50051".parse()?;
//!     let detector = ThresholdDetector::new(PixelFormat::Bgra8, 200);
//!     let server = Server::bind(&endpoint, SessionConfig::default(), Processor::detect(detector)).await?;
//!     server.serve().await
//! }
//! ```

pub mod codec;
pub mod detect;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod report;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use detect::{Detector, Region, ThresholdDetector};
pub use error::{FramewireError, Result};
pub use media::{FrameSink, FrameSource, IterSource, SyntheticSource};
pub use pipeline::Processor;
pub use protocol::{Frame, PixelFormat};
pub use report::{write_stdout_json, SessionReport};
pub use server::Server;
pub use session::{Role, Session, SessionBuilder, SessionConfig};
pub use supervisor::CancelHandle;
pub use transport::{Endpoint, Listener};
