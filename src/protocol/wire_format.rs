//! Wire format encoding and decoding.
//!
//! Every [`WireMessage`] travels as a 5-byte header followed by its body:
//! ```text
//! ┌──────┬──────────┬──────────────┐
//! │ Kind │ Length   │ Body         │
//! │ 1 B  │ uint32 BE│ Length bytes │
//! └──────┴──────────┴──────────────┘
//! ```
//!
//! Metadata bodies are exactly 9 bytes (rows u32 BE, cols u32 BE, pixel
//! format u8). DataChunk bodies carry 1 to [`CHUNK_SIZE`] payload bytes.

use bytes::Bytes;

use super::frame::{frame_len, PixelFormat};
use crate::error::{FramewireError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Maximum payload bytes carried by one DataChunk.
pub const CHUNK_SIZE: usize = 1024;

/// Metadata body size in bytes.
pub const METADATA_BODY_SIZE: usize = 9;

/// Message kind tags.
pub mod kind {
    /// Start of a new frame.
    pub const METADATA: u8 = 0x01;
    /// Slice of the current frame's payload.
    pub const DATA_CHUNK: u8 = 0x02;
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message kind (see `kind` module).
    pub kind: u8,
    /// Body length in bytes.
    pub body_length: u32,
}

impl Header {
    pub fn new(kind: u8, body_length: u32) -> Self {
        Self { kind, body_length }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (5 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.kind;
        buf[1..5].copy_from_slice(&self.body_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use framewire::protocol::{kind, Header};
    ///
    /// let header = Header::decode(&[0x02, 0, 0, 4, 0]).unwrap();
    /// assert_eq!(header.kind, kind::DATA_CHUNK);
    /// assert_eq!(header.body_length, 1024);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            kind: buf[0],
            body_length: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Kind is known
    /// - Metadata body is exactly 9 bytes
    /// - DataChunk body is 1..=CHUNK_SIZE bytes
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            kind::METADATA => {
                if self.body_length as usize != METADATA_BODY_SIZE {
                    return Err(FramewireError::Framing(format!(
                        "Metadata body must be {} bytes, got {}",
                        METADATA_BODY_SIZE, self.body_length
                    )));
                }
            }
            kind::DATA_CHUNK => {
                if self.body_length == 0 {
                    return Err(FramewireError::Framing(
                        "DataChunk must carry at least one byte".to_string(),
                    ));
                }
                if self.body_length as usize > CHUNK_SIZE {
                    return Err(FramewireError::Framing(format!(
                        "DataChunk size {} exceeds maximum {}",
                        self.body_length, CHUNK_SIZE
                    )));
                }
            }
            other => {
                return Err(FramewireError::Framing(format!(
                    "Unknown message kind 0x{:02x}",
                    other
                )));
            }
        }
        Ok(())
    }
}

/// Announces the start of a frame and its geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub rows: u32,
    pub cols: u32,
    pub pixel_format: PixelFormat,
}

impl Metadata {
    pub fn new(rows: u32, cols: u32, pixel_format: PixelFormat) -> Self {
        Self {
            rows,
            cols,
            pixel_format,
        }
    }

    /// Total payload bytes the announced frame will carry.
    #[inline]
    pub fn payload_len(&self) -> Option<usize> {
        frame_len(self.rows, self.cols, self.pixel_format)
    }

    pub fn encode(&self) -> [u8; METADATA_BODY_SIZE] {
        let mut buf = [0u8; METADATA_BODY_SIZE];
        buf[0..4].copy_from_slice(&self.rows.to_be_bytes());
        buf[4..8].copy_from_slice(&self.cols.to_be_bytes());
        buf[8] = self.pixel_format.as_u8();
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != METADATA_BODY_SIZE {
            return Err(FramewireError::Framing(format!(
                "Metadata body must be {} bytes, got {}",
                METADATA_BODY_SIZE,
                buf.len()
            )));
        }
        Ok(Self {
            rows: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            cols: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            pixel_format: PixelFormat::try_from(buf[8])?,
        })
    }
}

/// One unit on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Metadata(Metadata),
    DataChunk(Bytes),
}

impl WireMessage {
    /// Header describing this message.
    pub fn header(&self) -> Header {
        match self {
            WireMessage::Metadata(_) => Header::new(kind::METADATA, METADATA_BODY_SIZE as u32),
            WireMessage::DataChunk(bytes) => Header::new(kind::DATA_CHUNK, bytes.len() as u32),
        }
    }

    /// Encoded body (zero-copy for chunks).
    pub fn body(&self) -> Bytes {
        match self {
            WireMessage::Metadata(metadata) => Bytes::copy_from_slice(&metadata.encode()),
            WireMessage::DataChunk(bytes) => bytes.clone(),
        }
    }

    /// Rebuild a message from a validated header and its body.
    pub fn decode(header: &Header, body: Bytes) -> Result<Self> {
        header.validate()?;
        match header.kind {
            kind::METADATA => Ok(WireMessage::Metadata(Metadata::decode(&body)?)),
            _ => Ok(WireMessage::DataChunk(body)),
        }
    }

    /// Header and body as one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body();
        let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
        buf.extend_from_slice(&self.header().encode());
        buf.extend_from_slice(&body);
        buf
    }

    #[inline]
    pub fn is_metadata(&self) -> bool {
        matches!(self, WireMessage::Metadata(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(kind::DATA_CHUNK, 0x01020304);
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x02);
        assert_eq!(&bytes[1..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 4];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_unknown_kind() {
        let result = Header::new(0x7F, 1).validate();
        assert!(result.unwrap_err().to_string().contains("Unknown message kind"));
    }

    #[test]
    fn test_validate_metadata_length() {
        assert!(Header::new(kind::METADATA, 9).validate().is_ok());
        assert!(Header::new(kind::METADATA, 8).validate().is_err());
    }

    #[test]
    fn test_validate_chunk_bounds() {
        assert!(Header::new(kind::DATA_CHUNK, 1).validate().is_ok());
        assert!(Header::new(kind::DATA_CHUNK, CHUNK_SIZE as u32).validate().is_ok());

        let too_big = Header::new(kind::DATA_CHUNK, CHUNK_SIZE as u32 + 1).validate();
        assert!(too_big.unwrap_err().to_string().contains("exceeds maximum"));

        let empty = Header::new(kind::DATA_CHUNK, 0).validate();
        assert!(empty.unwrap_err().to_string().contains("at least one byte"));
    }

    #[test]
    fn test_metadata_layout() {
        let metadata = Metadata::new(480, 640, PixelFormat::Bgra8);
        let bytes = metadata.encode();

        assert_eq!(&bytes[0..4], &480u32.to_be_bytes());
        assert_eq!(&bytes[4..8], &640u32.to_be_bytes());
        assert_eq!(bytes[8], 3);
        assert_eq!(Metadata::decode(&bytes).unwrap(), metadata);
        assert_eq!(metadata.payload_len(), Some(480 * 640 * 4));
    }

    #[test]
    fn test_metadata_unknown_format_rejected() {
        let mut bytes = Metadata::new(1, 1, PixelFormat::Gray8).encode();
        bytes[8] = 42;
        assert!(matches!(
            Metadata::decode(&bytes),
            Err(FramewireError::Framing(_))
        ));
    }

    #[test]
    fn test_message_to_bytes() {
        let msg = WireMessage::DataChunk(Bytes::from_static(b"pixels"));
        let bytes = msg.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE + 6);
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header, msg.header());
        assert_eq!(&bytes[HEADER_SIZE..], b"pixels");
    }

    #[test]
    fn test_message_decode_dispatch() {
        let metadata = Metadata::new(2, 2, PixelFormat::Rgb8);
        let msg = WireMessage::Metadata(metadata);
        let decoded = WireMessage::decode(&msg.header(), msg.body()).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_metadata());
    }
}
