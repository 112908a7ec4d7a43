//! Frame struct and pixel formats.
//!
//! A [`Frame`] is an immutable pixel buffer plus the dimensions and layout
//! needed to interpret it. Payload storage is `bytes::Bytes`, so handing a
//! frame between pipeline stages or slicing it into wire chunks never copies
//! pixel data.
//!
//! # Example
//!
//! ```
//! use framewire::protocol::{Frame, PixelFormat};
//!
//! let frame = Frame::new(2, 3, PixelFormat::Gray8, vec![0u8; 6]).unwrap();
//! assert_eq!(frame.len(), 6);
//! assert_eq!(frame.pixel_format().bytes_per_pixel(), 1);
//! ```

use bytes::Bytes;
use serde::Serialize;

use super::wire_format::Metadata;
use crate::error::{FramewireError, Result};

/// Byte layout of a single pixel.
///
/// The discriminant is the tag carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PixelFormat {
    /// 8-bit single channel.
    Gray8 = 0,
    /// 8-bit blue, green, red.
    Bgr8 = 1,
    /// 8-bit red, green, blue.
    Rgb8 = 2,
    /// 8-bit blue, green, red, alpha (camera capture layout).
    Bgra8 = 3,
    /// 8-bit red, green, blue, alpha.
    Rgba8 = 4,
}

impl PixelFormat {
    /// Number of bytes one pixel occupies.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
        }
    }

    /// Wire tag for this format.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag. Returns `None` for unknown tags.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PixelFormat::Gray8),
            1 => Some(PixelFormat::Bgr8),
            2 => Some(PixelFormat::Rgb8),
            3 => Some(PixelFormat::Bgra8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = FramewireError;

    fn try_from(tag: u8) -> Result<Self> {
        PixelFormat::from_u8(tag)
            .ok_or_else(|| FramewireError::Framing(format!("Unknown pixel format tag {}", tag)))
    }
}

/// Byte length of a `rows x cols` buffer in `format`.
///
/// Returns `None` if the size does not fit in `usize`.
pub fn frame_len(rows: u32, cols: u32, format: PixelFormat) -> Option<usize> {
    (rows as usize)
        .checked_mul(cols as usize)?
        .checked_mul(format.bytes_per_pixel())
}

/// A rectangular pixel buffer.
///
/// Invariant: `data().len() == rows * cols * bytes_per_pixel`. Fields are
/// private so the invariant holds for every value in circulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    rows: u32,
    cols: u32,
    pixel_format: PixelFormat,
    data: Bytes,
}

impl Frame {
    /// Create a frame, checking that `data` matches the dimensions.
    pub fn new(
        rows: u32,
        cols: u32,
        pixel_format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let data = data.into();
        let expected = frame_len(rows, cols, pixel_format).ok_or_else(|| {
            FramewireError::Framing(format!(
                "Frame size {}x{} {:?} overflows",
                rows, cols, pixel_format
            ))
        })?;

        if data.len() != expected {
            return Err(FramewireError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            rows,
            cols,
            pixel_format,
            data,
        })
    }

    /// Create a frame from the metadata that announced it.
    pub fn from_metadata(metadata: &Metadata, data: impl Into<Bytes>) -> Result<Self> {
        Self::new(metadata.rows, metadata.cols, metadata.pixel_format, data)
    }

    /// Create an all-zero frame.
    pub fn zeroed(rows: u32, cols: u32, pixel_format: PixelFormat) -> Result<Self> {
        let len = frame_len(rows, cols, pixel_format).ok_or_else(|| {
            FramewireError::Framing(format!(
                "Frame size {}x{} {:?} overflows",
                rows, cols, pixel_format
            ))
        })?;
        Self::new(rows, cols, pixel_format, vec![0u8; len])
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Pixel bytes, row-major.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cheap clone of the pixel bytes.
    #[inline]
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Consume the frame and return its pixel bytes.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Header announcing this frame on the wire.
    pub fn metadata(&self) -> Metadata {
        Metadata::new(self.rows, self.cols, self.pixel_format)
    }
}
