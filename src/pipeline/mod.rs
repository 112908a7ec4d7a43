//! Pipeline stages.
//!
//! ```text
//! Initiator:  FrameSource ─► SourceFeeder ─► [queue] ─► OutboundPump ─► channel
//!             channel ─► InboundPump ─► [queue] ─► RenderStage ─► FrameSink
//!
//! Responder:  channel ─► InboundPump ─► [queue] ─► ProcessingStage ─► [queue] ─► OutboundPump ─► channel
//! ```
//!
//! Each stage runs as its own task and reports its terminal error to the
//! [`Supervisor`](crate::supervisor::Supervisor) before releasing its queue
//! handles.

mod inbound;
mod outbound;
mod processing;

pub use inbound::InboundPump;
pub use outbound::OutboundPump;
pub use processing::{ProcessingStage, Processor, RenderStage, SourceFeeder};
