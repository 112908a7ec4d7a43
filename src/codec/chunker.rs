//! Frame encoder - splits a frame into wire messages.
//!
//! One `Metadata` message is followed by `ceil(len / CHUNK_SIZE)` data chunks,
//! the last possibly shorter. Chunks are `Bytes` slices of the frame's own
//! buffer, so encoding allocates nothing per chunk.
//!
//! # Example
//!
//! ```
//! use framewire::codec::encode_frame;
//! use framewire::protocol::{Frame, PixelFormat, WireMessage};
//!
//! let frame = Frame::zeroed(1, 1500, PixelFormat::Gray8).unwrap();
//! let messages: Vec<WireMessage> = encode_frame(&frame).collect();
//!
//! assert_eq!(messages.len(), 3); // metadata + 1024 + 476
//! assert!(messages[0].is_metadata());
//! ```

use bytes::Bytes;

use crate::protocol::{Frame, Metadata, WireMessage, CHUNK_SIZE};

/// Number of data chunks needed for `len` payload bytes.
#[inline]
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

/// Encode a frame into its wire messages, in send order.
pub fn encode_frame(frame: &Frame) -> FrameMessages {
    FrameMessages {
        metadata: Some(frame.metadata()),
        data: frame.data_bytes(),
        offset: 0,
    }
}

/// Iterator over the messages of one encoded frame.
#[derive(Debug, Clone)]
pub struct FrameMessages {
    metadata: Option<Metadata>,
    data: Bytes,
    offset: usize,
}

impl Iterator for FrameMessages {
    type Item = WireMessage;

    fn next(&mut self) -> Option<WireMessage> {
        if let Some(metadata) = self.metadata.take() {
            return Some(WireMessage::Metadata(metadata));
        }

        if self.offset >= self.data.len() {
            return None;
        }

        let end = (self.offset + CHUNK_SIZE).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Some(WireMessage::DataChunk(chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let header = usize::from(self.metadata.is_some());
        let remaining = header + chunk_count(self.data.len() - self.offset);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameMessages {}
