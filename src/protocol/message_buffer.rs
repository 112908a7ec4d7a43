//! Message buffer for accumulating partial socket reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented messages:
//! - `WaitingForHeader`: Need at least 5 bytes
//! - `WaitingForBody`: Header parsed, need N more body bytes
//!
//! # Example
//!
//! ```
//! use framewire::protocol::{MessageBuffer, WireMessage};
//! use bytes::Bytes;
//!
//! let bytes = WireMessage::DataChunk(Bytes::from_static(b"abc")).to_bytes();
//!
//! let mut buffer = MessageBuffer::new();
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let messages = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(messages.len(), 1);
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, WireMessage, HEADER_SIZE};
use crate::error::{FramewireError, Result};

/// State machine for message parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 5 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
#[derive(Debug)]
pub struct MessageBuffer {
    buffer: BytesMut,
    state: State,
}

impl MessageBuffer {
    /// Create a new message buffer with a 64KB initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(64 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data is kept for the next push. Messages come out in the
    /// order their bytes arrived.
    ///
    /// # Errors
    ///
    /// Returns a framing error as soon as an invalid header is seen.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<WireMessage>> {
        self.extend(data);

        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }

        Ok(messages)
    }

    /// Append bytes without parsing them.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete message, if one is buffered.
    ///
    /// Messages ahead of an invalid header are still returned one by one
    /// before the error.
    pub fn next_message(&mut self) -> Result<Option<WireMessage>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };

                    // Reject before buffering a body we would never accept.
                    header.validate()?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForBody { header };
                }

                State::WaitingForBody { header } => {
                    let needed = header.body_length as usize;
                    if self.buffer.len() < needed {
                        return Ok(None);
                    }

                    let header = *header;
                    let body = self.buffer.split_to(needed).freeze();
                    self.state = State::WaitingForHeader;

                    return WireMessage::decode(&header, body).map(Some);
                }
            }
        }
    }

    /// Check that no partial message is buffered.
    ///
    /// Called when the peer half-closes: leftover bytes mean the stream was
    /// cut inside a message.
    pub fn finish(&self) -> Result<()> {
        match &self.state {
            State::WaitingForHeader if self.buffer.is_empty() => Ok(()),
            State::WaitingForHeader => Err(FramewireError::TruncatedStream {
                received: self.buffer.len(),
                expected: HEADER_SIZE,
            }),
            State::WaitingForBody { header } => Err(FramewireError::TruncatedStream {
                received: self.buffer.len(),
                expected: header.body_length as usize,
            }),
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
