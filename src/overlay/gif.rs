use std::path::Path;

use image::{Rgba, RgbaImage};
use tracing::{debug, info};

use crate::error::{DecodeError, Result};
use crate::overlay::frame_source::{FrameSource, GifFrameSource};
use crate::overlay::TextureOverlay;
use crate::types::Size;

/// Animated overlay backed by an animated GIF
pub type GifOverlay = AnimatedOverlay<GifFrameSource>;

/// Overlay that shows one decoded frame per compositor query
///
/// Playback is paced by queries, not by time: the presentation timestamp is
/// ignored, so the animation runs at the compositor's output frame rate
/// rather than at the source's own frame delays.
///
/// A cycle shows `frame_count - 1` frames and is followed by one query that
/// returns the transparent 1x1 fallback and starts the next cycle. Starting
/// a cycle rewinds the source and skips its first frame, so only the very
/// first cycle ever shows frame 0.
pub struct AnimatedOverlay<S: FrameSource> {
    source: S,
    size: Size,
    fallback: RgbaImage,
    frame_count: usize,
    shown: usize,
}

impl<S: FrameSource> AnimatedOverlay<S> {
    pub fn new(source: S, size: Size) -> Self {
        let frame_count = source.frame_count().max(1);
        Self {
            source,
            size,
            fallback: RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0])),
            frame_count,
            shown: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Frames shown in the current cycle, always below `frame_count`
    pub fn shown_count(&self) -> usize {
        self.shown
    }

    pub fn fallback(&self) -> &RgbaImage {
        &self.fallback
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl GifOverlay {
    /// Decode an animated GIF held in memory
    pub fn decode(data: &[u8], size: Size) -> std::result::Result<Self, DecodeError> {
        let source = GifFrameSource::decode(data)?;
        Ok(Self::new(source, size))
    }

    /// Read and decode an animated GIF from disk
    pub fn open<P: AsRef<Path>>(path: P, size: Size) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let overlay = Self::decode(&data, size)?;

        info!(
            "Animated overlay {:?}: {} frames, {}ms per loop, rendered at {}",
            path.file_name().unwrap_or_default(),
            overlay.frame_count,
            overlay.source.loop_duration().as_millis(),
            size
        );

        Ok(overlay)
    }
}

impl<S: FrameSource> TextureOverlay for AnimatedOverlay<S> {
    fn name(&self) -> &str {
        "animated"
    }

    fn bitmap(&mut self, _presentation_time_us: i64) -> &RgbaImage {
        if self.shown < self.frame_count - 1 {
            self.shown += 1;
            match self.source.next_frame() {
                Some(frame) => frame,
                None => &self.fallback,
            }
        } else {
            debug!("Animated overlay cycle complete after {} frames", self.shown);
            self.shown = 0;
            self.source.reset();
            self.source.advance();
            &self.fallback
        }
    }

    fn texture_size(&self, _presentation_time_us: i64) -> Size {
        self.size
    }
}
