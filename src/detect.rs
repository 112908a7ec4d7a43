//! Detection and annotation.
//!
//! A [`Detector`] finds regions of interest in a frame and returns the frame
//! with each region outlined. Detectors are synchronous and may be slow; the
//! Responder calls them on the blocking thread pool.

use crate::error::Result;
use crate::protocol::{Frame, PixelFormat};

/// Outline colour, in B, G, R order.
pub const DEFAULT_COLOR: [u8; 3] = [200, 200, 255];

/// Outline thickness in pixels.
pub const DEFAULT_THICKNESS: u32 = 3;

/// Finds regions in a frame and draws them onto it.
///
/// Implementations must be thread-safe; one detector is shared by every
/// frame of a session.
pub trait Detector: Send + Sync + 'static {
    /// The only pixel layout this detector accepts.
    fn expected_format(&self) -> PixelFormat;

    /// Return `frame` with detected regions drawn on it.
    ///
    /// An error drops this frame only.
    fn detect_and_annotate(&self, frame: Frame) -> Result<Frame>;
}

/// Inclusive pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Region {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left) + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top) + 1
    }
}

/// Write `color` (B, G, R) into one pixel in `format`'s byte order.
fn put_pixel(pixel: &mut [u8], format: PixelFormat, [b, g, r]: [u8; 3]) {
    match format {
        PixelFormat::Gray8 => pixel[0] = luma(r, g, b),
        PixelFormat::Bgr8 | PixelFormat::Bgra8 => pixel[..3].copy_from_slice(&[b, g, r]),
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => pixel[..3].copy_from_slice(&[r, g, b]),
    }
}

/// Brightness of one pixel in `format`'s byte order.
fn pixel_luma(pixel: &[u8], format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Gray8 => pixel[0],
        PixelFormat::Bgr8 | PixelFormat::Bgra8 => luma(pixel[2], pixel[1], pixel[0]),
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => luma(pixel[0], pixel[1], pixel[2]),
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Outline `region` in a `rows x cols` pixel buffer.
///
/// The region is clamped to the image. The border grows inward by
/// `thickness` pixels.
pub fn draw_rectangle(
    data: &mut [u8],
    rows: u32,
    cols: u32,
    format: PixelFormat,
    region: Region,
    color: [u8; 3],
    thickness: u32,
) {
    if rows == 0 || cols == 0 || thickness == 0 {
        return;
    }

    let bpp = format.bytes_per_pixel();
    let left = region.left.min(cols - 1);
    let right = region.right.min(cols - 1);
    let top = region.top.min(rows - 1);
    let bottom = region.bottom.min(rows - 1);
    if left > right || top > bottom {
        return;
    }

    for y in top..=bottom {
        for x in left..=right {
            let on_border = x - left < thickness
                || right - x < thickness
                || y - top < thickness
                || bottom - y < thickness;
            if on_border {
                let offset = (y as usize * cols as usize + x as usize) * bpp;
                put_pixel(&mut data[offset..offset + bpp], format, color);
            }
        }
    }
}

/// Copy `frame` with every region outlined.
pub fn annotate(frame: &Frame, regions: &[Region], color: [u8; 3], thickness: u32) -> Result<Frame> {
    if regions.is_empty() {
        return Ok(frame.clone());
    }

    let mut data = frame.data().to_vec();
    for region in regions {
        draw_rectangle(
            &mut data,
            frame.rows(),
            frame.cols(),
            frame.pixel_format(),
            *region,
            color,
            thickness,
        );
    }
    Frame::new(frame.rows(), frame.cols(), frame.pixel_format(), data)
}

/// Outlines the bounding box of all pixels at or above a brightness threshold.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    format: PixelFormat,
    threshold: u8,
    min_pixels: usize,
    color: [u8; 3],
    thickness: u32,
}

impl ThresholdDetector {
    pub fn new(format: PixelFormat, threshold: u8) -> Self {
        Self {
            format,
            threshold,
            min_pixels: 1,
            color: DEFAULT_COLOR,
            thickness: DEFAULT_THICKNESS,
        }
    }

    /// Ignore frames with fewer bright pixels than this.
    pub fn min_pixels(mut self, min_pixels: usize) -> Self {
        self.min_pixels = min_pixels.max(1);
        self
    }

    pub fn color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness;
        self
    }

    /// Bounding box of the bright pixels, if there are enough of them.
    pub fn detect(&self, frame: &Frame) -> Option<Region> {
        let bpp = frame.pixel_format().bytes_per_pixel();
        let cols = frame.cols() as usize;
        let mut bounds: Option<Region> = None;
        let mut count = 0usize;

        for (i, pixel) in frame.data().chunks_exact(bpp).enumerate() {
            if pixel_luma(pixel, frame.pixel_format()) < self.threshold {
                continue;
            }
            count += 1;
            let x = (i % cols) as u32;
            let y = (i / cols) as u32;
            bounds = Some(match bounds {
                None => Region::new(x, y, x, y),
                Some(r) => Region::new(r.left.min(x), r.top.min(y), r.right.max(x), r.bottom.max(y)),
            });
        }

        bounds.filter(|_| count >= self.min_pixels)
    }
}

impl Detector for ThresholdDetector {
    fn expected_format(&self) -> PixelFormat {
        self.format
    }

    fn detect_and_annotate(&self, frame: Frame) -> Result<Frame> {
        match self.detect(&frame) {
            Some(region) => {
                tracing::trace!(?region, "Detected region");
                annotate(&frame, &[region], self.color, self.thickness)
            }
            None => Ok(frame),
        }
    }
}
