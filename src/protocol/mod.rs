//! Protocol module - frames, wire format, and message framing.
//!
//! This module implements the data model and the byte-level protocol:
//! - [`Frame`] and [`PixelFormat`]
//! - 5-byte message header encoding/decoding
//! - Message buffer for accumulating partial reads

mod frame;
mod message_buffer;
mod wire_format;

pub use frame::{frame_len, Frame, PixelFormat};
pub use message_buffer::MessageBuffer;
pub use wire_format::{kind, Header, Metadata, WireMessage, CHUNK_SIZE, HEADER_SIZE, METADATA_BODY_SIZE};
