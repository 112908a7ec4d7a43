//! Frame reassembly state machine.
//!
//! Consumes wire messages in arrival order and materializes complete frames:
//! - `AwaitMetadata`: no frame in flight; only `Metadata` is legal
//! - `Accumulating`: a frame was announced and chunks are being collected
//!
//! A frame completes the moment its accumulated length reaches the length
//! implied by its metadata (immediately, for zero-byte frames).

use bytes::BytesMut;

use crate::error::{FramewireError, Result};
use crate::protocol::{Frame, Metadata, WireMessage};

/// Default upper bound on a single announced frame (64 MB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug)]
enum State {
    AwaitMetadata,
    Accumulating {
        metadata: Metadata,
        expected: usize,
        buffer: BytesMut,
    },
}

/// Rebuilds frames from a message sequence.
#[derive(Debug)]
pub struct Reassembler {
    state: State,
    max_frame_bytes: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a reassembler that rejects frames announcing more than
    /// `max_frame_bytes` of payload.
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            state: State::AwaitMetadata,
            max_frame_bytes,
        }
    }

    /// Feed one message.
    ///
    /// Returns `Ok(Some(frame))` when this message completed a frame.
    ///
    /// # Errors
    ///
    /// - `Framing` for metadata arriving mid-frame, a chunk with no frame in
    ///   flight, a chunk overrunning the announced length, or an oversized
    ///   announcement.
    pub fn push(&mut self, message: WireMessage) -> Result<Option<Frame>> {
        match message {
            WireMessage::Metadata(metadata) => self.start(metadata),
            WireMessage::DataChunk(bytes) => {
                let (metadata, expected, buffer) = match &mut self.state {
                    State::AwaitMetadata => {
                        return Err(FramewireError::Framing(
                            "DataChunk received with no active Metadata".to_string(),
                        ));
                    }
                    State::Accumulating {
                        metadata,
                        expected,
                        buffer,
                    } => (metadata, *expected, buffer),
                };

                if buffer.len() + bytes.len() > expected {
                    return Err(FramewireError::Framing(format!(
                        "DataChunk overruns frame: {} + {} > {} bytes",
                        buffer.len(),
                        bytes.len(),
                        expected
                    )));
                }

                buffer.extend_from_slice(&bytes);
                if buffer.len() < expected {
                    return Ok(None);
                }

                let metadata = *metadata;
                let data = std::mem::take(buffer).freeze();
                self.state = State::AwaitMetadata;
                Frame::from_metadata(&metadata, data).map(Some)
            }
        }
    }

    fn start(&mut self, metadata: Metadata) -> Result<Option<Frame>> {
        if let State::Accumulating {
            expected, buffer, ..
        } = &self.state
        {
            return Err(FramewireError::Framing(format!(
                "Metadata received while previous frame incomplete ({} of {} bytes)",
                buffer.len(),
                expected
            )));
        }

        let expected = metadata
            .payload_len()
            .filter(|len| *len <= self.max_frame_bytes)
            .ok_or_else(|| {
                FramewireError::Framing(format!(
                    "Frame {}x{} {:?} exceeds maximum {} bytes",
                    metadata.rows, metadata.cols, metadata.pixel_format, self.max_frame_bytes
                ))
            })?;

        if expected == 0 {
            return Frame::from_metadata(&metadata, Vec::new()).map(Some);
        }

        self.state = State::Accumulating {
            metadata,
            expected,
            buffer: BytesMut::with_capacity(expected),
        };
        Ok(None)
    }

    /// Check the stream may end here.
    ///
    /// # Errors
    ///
    /// `TruncatedStream` if a frame is mid-accumulation.
    pub fn finish(&self) -> Result<()> {
        match &self.state {
            State::AwaitMetadata => Ok(()),
            State::Accumulating {
                expected, buffer, ..
            } => Err(FramewireError::TruncatedStream {
                received: buffer.len(),
                expected: *expected,
            }),
        }
    }

    /// Whether a frame is currently in flight.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode exactly one frame from a complete message sequence.
///
/// # Errors
///
/// Fails on any framing violation, if the sequence ends before the frame
/// completes, or if messages remain after it.
pub fn decode_frame<I>(messages: I) -> Result<Frame>
where
    I: IntoIterator<Item = WireMessage>,
{
    let mut reassembler = Reassembler::new();
    let mut frame = None;

    for message in messages {
        if frame.is_some() {
            return Err(FramewireError::Framing(
                "Trailing message after complete frame".to_string(),
            ));
        }
        frame = reassembler.push(message)?;
    }

    reassembler.finish()?;
    frame.ok_or_else(|| FramewireError::Framing("No Metadata in message sequence".to_string()))
}
