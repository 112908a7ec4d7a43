//! Frame sources and sinks at the edges of the Initiator.
//!
//! The Initiator pulls frames from a [`FrameSource`] (a camera, a file, a
//! generator) and hands processed frames to a [`FrameSink`] (a display, a
//! recorder, a test collector).

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use crate::error::Result;
use crate::protocol::{Frame, PixelFormat};
use crate::transport::BoxFuture;

/// Produces frames for the Initiator.
pub trait FrameSource: Send {
    /// Next frame, or `Ok(None)` at end of input.
    ///
    /// An error ends the session.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>>>;
}

/// Consumes frames returned by the Responder. Infallible.
pub trait FrameSink: Send {
    fn accept(&mut self, frame: Frame);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) + Send,
{
    fn accept(&mut self, frame: Frame) {
        self(frame)
    }
}

/// Source backed by an iterator.
pub struct IterSource {
    frames: Box<dyn Iterator<Item = Result<Frame>> + Send>,
}

impl IterSource {
    /// Yield each item in turn; an `Err` item fails the session.
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<Frame>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            frames: Box::new(items.into_iter()),
        }
    }

    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Frame>,
        I::IntoIter: Send + 'static,
    {
        Self::new(frames.into_iter().map(Ok))
    }
}

impl std::fmt::Debug for IterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterSource").finish_non_exhaustive()
    }
}

impl FrameSource for IterSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>>> {
        let next = self.frames.next().transpose();
        Box::pin(async move { next })
    }
}

/// Generates frames with a bright square sweeping across a dark background.
#[derive(Debug)]
pub struct SyntheticSource {
    rows: u32,
    cols: u32,
    format: PixelFormat,
    square: u32,
    limit: Option<u64>,
    produced: u64,
    period: Option<Duration>,
    ticker: Option<Interval>,
}

impl SyntheticSource {
    pub fn new(rows: u32, cols: u32, format: PixelFormat) -> Self {
        Self {
            rows,
            cols,
            format,
            square: (rows.min(cols) / 4).max(1),
            limit: None,
            produced: 0,
            period: None,
            ticker: None,
        }
    }

    /// Stop after `count` frames. Unlimited by default.
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Pace output to `fps` frames per second. Unpaced by default.
    pub fn fps(mut self, fps: u32) -> Self {
        self.period = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    fn render(&self, index: u64) -> Result<Frame> {
        let bpp = self.format.bytes_per_pixel();
        let mut data = vec![16u8; self.rows as usize * self.cols as usize * bpp];

        if self.rows > 0 && self.cols > 0 {
            let span = self.cols.saturating_sub(self.square).max(1) as u64;
            let left = (index % span) as u32;
            let top = self.rows.saturating_sub(self.square) / 2;
            let bottom = (top + self.square).min(self.rows);
            let right = (left + self.square).min(self.cols);

            for y in top..bottom {
                let row_start = (y as usize * self.cols as usize + left as usize) * bpp;
                let row_end = (y as usize * self.cols as usize + right as usize) * bpp;
                data[row_start..row_end].fill(240);
            }
        }

        Frame::new(self.rows, self.cols, self.format, data)
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>>> {
        Box::pin(async move {
            if self.limit.is_some_and(|limit| self.produced >= limit) {
                return Ok(None);
            }

            if let Some(period) = self.period {
                let ticker = self.ticker.get_or_insert_with(|| {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker
                });
                ticker.tick().await;
            }

            let frame = self.render(self.produced)?;
            self.produced += 1;
            Ok(Some(frame))
        })
    }
}
