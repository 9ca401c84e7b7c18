//! # Clip-Composer
//!
//! Assemble short vertical videos from picked clips, stills, soundtracks and
//! animated GIF filters.
//!
//! The library describes export jobs declaratively and delegates the media
//! work to a transformation pipeline. The bundled pipeline drives an external
//! `ffmpeg` binary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use clip_composer::{Config, EditingSession, FfmpegTransformer};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let transformer = Arc::new(FfmpegTransformer::new(config.ffmpeg.clone()));
//! let session = EditingSession::new(transformer, config);
//!
//! let handle = session
//!     .process_animated_filter(Path::new("photo.jpg"), Path::new("sparkles.gif"))
//!     .await?;
//! println!("Writing {}", handle.output_path().display());
//!
//! let outcome = handle.wait().await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`overlay`] - GIF frame cycling and static image overlays
//! - [`composition`] - Job description model and the built-in job shapes
//! - [`pipeline`] - The `Transformer` seam and the ffmpeg backend
//! - [`session`] - Single-job orchestration, progress and outcomes
//! - [`config`] - Configuration management
//!
//! ## Custom overlays
//!
//! Anything implementing [`TextureOverlay`](overlay::TextureOverlay) can be
//! drawn by the pipeline:
//!
//! ```rust
//! use clip_composer::overlay::TextureOverlay;
//! use clip_composer::types::Size;
//! use image::{Rgba, RgbaImage};
//!
//! struct Blink {
//!     on: RgbaImage,
//!     off: RgbaImage,
//!     lit: bool,
//! }
//!
//! impl TextureOverlay for Blink {
//!     fn name(&self) -> &str {
//!         "blink"
//!     }
//!
//!     fn bitmap(&mut self, _presentation_time_us: i64) -> &RgbaImage {
//!         self.lit = !self.lit;
//!         if self.lit { &self.on } else { &self.off }
//!     }
//!
//!     fn texture_size(&self, _presentation_time_us: i64) -> Size {
//!         Size::new(self.on.width(), self.on.height())
//!     }
//! }
//!
//! let mut blink = Blink {
//!     on: RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])),
//!     off: RgbaImage::new(2, 2),
//!     lit: false,
//! };
//! assert_eq!(blink.bitmap(0)[(0, 0)], Rgba([255, 0, 0, 255]));
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod staging;
pub mod types;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{EditorError, Result},
    overlay::{GifOverlay, StaticOverlay, TextureOverlay},
    pipeline::{ExportOutcome, FfmpegTransformer, ProgressState, Transformer},
    session::{EditingSession, ExportHandle, SessionState},
};
