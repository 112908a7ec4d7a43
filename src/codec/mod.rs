//! Codec module - frame chunking and reassembly.
//!
//! - [`encode_frame`] - one frame to `Metadata` + `DataChunk`s
//! - [`Reassembler`] - message sequence back to frames
//!
//! The codec is stateless on the encode side; the only state on the decode
//! side is the frame currently in flight.
//!
//! # Example
//!
//! ```
//! use framewire::codec::{decode_frame, encode_frame};
//! use framewire::protocol::{Frame, PixelFormat};
//!
//! let frame = Frame::new(2, 2, PixelFormat::Gray8, vec![1, 2, 3, 4]).unwrap();
//! let decoded = decode_frame(encode_frame(&frame)).unwrap();
//! assert_eq!(decoded, frame);
//! ```

mod chunker;
mod reassembly;

pub use chunker::{chunk_count, encode_frame, FrameMessages};
pub use reassembly::{decode_frame, Reassembler, DEFAULT_MAX_FRAME_BYTES};
