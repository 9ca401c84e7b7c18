//! # Compositions
//!
//! Declarative export jobs: which sources, which ranges, which effects and
//! which encoders. A [`Composition`] is handed to a
//! [`Transformer`](crate::pipeline::Transformer) which does the actual work.

pub mod jobs;
pub mod model;

// Re-exports for convenience
pub use model::{
    ClippingConfiguration, Composition, EditedMediaItem, Effect, EncoderSettings, Layout,
    MediaItem, MediaKind, OverlayEffect, Sequence, VideoCompositorSettings,
};
