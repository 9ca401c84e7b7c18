//! # Overlays
//!
//! Bitmaps composited on top of the base video or image content. The
//! compositing pipeline queries an overlay once per output frame.
//!
//! - [`StaticOverlay`] - one fixed bitmap, e.g. a logo or a sticker
//! - [`GifOverlay`] - an animated GIF decoded once and cycled per query
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clip_composer::overlay::{GifOverlay, TextureOverlay};
//! use clip_composer::types::Size;
//!
//! # fn main() -> clip_composer::Result<()> {
//! let mut filter = GifOverlay::open("sparkles.gif", Size::portrait_hd())?;
//!
//! // The timestamp is ignored: every query shows the next frame
//! let first = filter.bitmap(0).clone();
//! let second = filter.bitmap(33_333).clone();
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod frame_source;
pub mod gif;

pub use bitmap::{load_scaled_bitmap, sample_size, StaticOverlay};
pub use frame_source::{FrameSource, GifFrameSource};
pub use gif::{AnimatedOverlay, GifOverlay};

use image::RgbaImage;

use crate::types::{OverlaySettings, Size};

/// A bitmap source queried by the compositor for every output frame
pub trait TextureOverlay: Send {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Bitmap to draw for the output frame at `presentation_time_us`
    ///
    /// Never fails; implementations degrade to a fallback bitmap.
    fn bitmap(&mut self, presentation_time_us: i64) -> &RgbaImage;

    /// Size the bitmap is stretched to before it is drawn
    fn texture_size(&self, presentation_time_us: i64) -> Size;

    /// Whether every query returns the same bitmap
    fn is_static(&self) -> bool {
        false
    }

    /// Placement of the texture on the frame
    fn overlay_settings(&self, presentation_time_us: i64) -> OverlaySettings {
        let _ = presentation_time_us;
        OverlaySettings::default()
    }
}
