//! The three job shapes the editor can export.
//!
//! Every builder is pure: it only arranges already-loaded inputs into a
//! [`Composition`]. Loading images and decoding overlays happens in the
//! session before these are called.

use std::path::Path;

use tracing::debug;

use crate::composition::model::{
    ClippingConfiguration, Composition, EditedMediaItem, Effect, EncoderSettings, Layout,
    MediaItem, OverlayEffect, Sequence, VideoCompositorSettings,
};
use crate::config::{AnimatedFilterJobConfig, LayoutJobConfig, OutputConfig, TimelineJobConfig};
use crate::overlay::{GifOverlay, StaticOverlay};
use crate::types::OverlaySettings;

fn encoder(output: &OutputConfig) -> EncoderSettings {
    EncoderSettings {
        video_mime_type: output.video_mime_type,
        audio_mime_type: output.audio_mime_type,
    }
}

fn full_frame(output: &OutputConfig) -> Effect {
    Effect::presentation(output.size.width, output.size.height, Layout::ScaleToFitWithCrop)
}

/// Two videos stacked on a portrait canvas with a sticker on top
///
/// Both videos loop. `video2` is input 0 and fills the bottom half,
/// `video1` is input 1 and fills the top half.
pub fn layout(
    video1: &Path,
    video2: &Path,
    sticker: StaticOverlay,
    job: &LayoutJobConfig,
    output: &OutputConfig,
) -> Composition {
    let tile = || {
        Effect::presentation(
            job.tile_size.width,
            job.tile_size.height,
            Layout::ScaleToFitWithCrop,
        )
    };
    let video1 = EditedMediaItem::new(MediaItem::new(video1).with_clipping(
        ClippingConfiguration::new(job.video1_clip.start_ms, job.video1_clip.end_ms),
    ))
    .with_effects(vec![tile()]);

    let video2 = EditedMediaItem::new(MediaItem::new(video2).with_clipping(
        ClippingConfiguration::new(job.video2_clip.start_ms, job.video2_clip.end_ms),
    ))
    .with_effects(vec![tile()]);

    let compositor = VideoCompositorSettings::new(output.size).with_input_settings(vec![
        // Input 0 (video2): top edge on the horizontal center line
        OverlaySettings::default()
            .with_overlay_frame_anchor(-1.0, 1.0)
            .with_background_frame_anchor(-1.0, 0.0),
        // Input 1 (video1): bottom edge on the horizontal center line
        OverlaySettings::default()
            .with_overlay_frame_anchor(-1.0, -1.0)
            .with_background_frame_anchor(-1.0, 0.0),
    ]);

    let composition = Composition::new(
        vec![Sequence::looping(vec![video2]), Sequence::looping(vec![video1])],
        output.size,
    )
    .with_compositor(compositor)
    .with_effects(vec![
        full_frame(output),
        Effect::frame_drop(job.frame_rate),
        Effect::Overlay(OverlayEffect::single(sticker)),
    ])
    .with_encoder(encoder(output));

    debug!("Built layout job: {:?}ms", composition.duration_ms());
    composition
}

/// Two video segments then a still image, over an audio track
///
/// The audio is clipped to the summed length of the three segments.
pub fn timeline(
    video1: &Path,
    video2: &Path,
    image: &Path,
    audio: &Path,
    job: &TimelineJobConfig,
    output: &OutputConfig,
) -> Composition {
    let segment = |path: &Path, start_ms: u64| {
        EditedMediaItem::new(MediaItem::new(path).with_clipping(ClippingConfiguration::new(
            start_ms,
            start_ms + job.video_duration_ms,
        )))
        .with_remove_audio(true)
        .with_effects(vec![full_frame(output), Effect::frame_drop(job.frame_rate)])
    };

    let still = EditedMediaItem::new(MediaItem::new(image))
        .with_duration_us(job.image_duration_ms * 1_000)
        .with_frame_rate(job.image_frame_rate);

    let total_ms = job.video_duration_ms * 2 + job.image_duration_ms;
    let soundtrack = EditedMediaItem::new(
        MediaItem::new(audio).with_clipping(ClippingConfiguration::new(0, total_ms)),
    );

    let composition = Composition::new(
        vec![
            Sequence::new(vec![
                segment(video1, job.video1_start_ms),
                segment(video2, job.video2_start_ms),
                still,
            ]),
            Sequence::new(vec![soundtrack]),
        ],
        output.size,
    )
    .with_effects(vec![full_frame(output), Effect::frame_drop(job.frame_rate)])
    .with_encoder(encoder(output));

    debug!("Built timeline job: {}ms", total_ms);
    composition
}

/// A still image with an animated filter on top for its whole duration
pub fn animated_filter(
    image: &Path,
    filter: GifOverlay,
    job: &AnimatedFilterJobConfig,
    output: &OutputConfig,
) -> Composition {
    let still = EditedMediaItem::new(MediaItem::new(image))
        .with_duration_us(job.image_duration_ms * 1_000)
        .with_frame_rate(job.image_frame_rate)
        .with_effects(vec![
            full_frame(output),
            Effect::Overlay(OverlayEffect::single(filter)),
        ]);

    Composition::new(vec![Sequence::new(vec![still])], output.size).with_encoder(encoder(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::model::MediaKind;
    use crate::config::Config;
    use crate::overlay::frame_source::test_gifs::solid_frames;
    use crate::types::Size;
    use image::RgbaImage;

    fn sticker() -> StaticOverlay {
        StaticOverlay::new(RgbaImage::new(300, 400))
    }

    #[test]
    fn test_layout_duration() {
        let config = Config::default();
        let composition = layout(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            sticker(),
            &config.layout,
            &config.output,
        );

        assert_eq!(composition.sequences[0].duration_ms(), Some(20_000));
        assert_eq!(composition.sequences[1].duration_ms(), Some(20_000));
        assert_eq!(composition.duration_ms(), Some(20_000));
        assert!(composition.sequences.iter().all(|sequence| sequence.looping));
        assert_eq!(composition.output_frame_rate(), 30.0);
    }

    #[test]
    fn test_layout_places_inputs_in_halves() {
        let config = Config::default();
        let composition = layout(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            sticker(),
            &config.layout,
            &config.output,
        );

        // Second video at the bottom, first video on top
        let source = |index: usize| composition.sequences[index].items[0].media_item.path.clone();
        assert_eq!(source(0), Path::new("b.mp4"));
        assert_eq!(source(1), Path::new("a.mp4"));

        let canvas = composition.compositor.output_size;
        let tile = config.layout.tile_size;
        let settings = &composition.compositor;
        assert_eq!(settings.overlay_settings(0).position(canvas, tile), (0, 960));
        assert_eq!(settings.overlay_settings(1).position(canvas, tile), (0, 0));
    }

    #[test]
    fn test_layout_effect_order() {
        let config = Config::default();
        let composition = layout(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            sticker(),
            &config.layout,
            &config.output,
        );

        assert!(matches!(
            composition.effects.as_slice(),
            [
                Effect::Presentation { layout: Layout::ScaleToFitWithCrop, .. },
                Effect::FrameDrop { .. },
                Effect::Overlay(_),
            ]
        ));
    }

    #[test]
    fn test_timeline_duration_and_audio_clip() {
        let config = Config::default();
        let composition = timeline(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            Path::new("still.jpg"),
            Path::new("song.mp3"),
            &config.timeline,
            &config.output,
        );

        assert_eq!(composition.duration_ms(), Some(45_000));

        let audio = &composition.sequences[1].items[0];
        assert_eq!(audio.media_item.kind(), MediaKind::Audio);
        assert_eq!(audio.media_item.clipping, ClippingConfiguration::new(0, 45_000));

        let video = &composition.sequences[0];
        assert_eq!(video.items.len(), 3);
        assert!(video.items[..2].iter().all(|item| item.remove_audio));
        assert_eq!(
            video.items[0].media_item.clipping,
            ClippingConfiguration::new(10_000, 30_000)
        );
        assert_eq!(video.items[2].duration_ms(), Some(5_000));
    }

    #[test]
    fn test_timeline_follows_config() {
        let mut config = Config::default();
        config.timeline.video_duration_ms = 3_000;
        config.timeline.image_duration_ms = 1_500;

        let composition = timeline(
            Path::new("a.mp4"),
            Path::new("b.mp4"),
            Path::new("still.jpg"),
            Path::new("song.mp3"),
            &config.timeline,
            &config.output,
        );

        assert_eq!(composition.duration_ms(), Some(7_500));
        assert_eq!(
            composition.sequences[1].items[0].media_item.clipping.end_ms,
            Some(7_500)
        );
    }

    #[test]
    fn test_animated_filter_job() {
        let config = Config::default();
        let filter = GifOverlay::decode(&solid_frames(3, 2, 2), Size::portrait_hd()).unwrap();
        let composition = animated_filter(
            Path::new("still.png"),
            filter,
            &config.animated_filter,
            &config.output,
        );

        assert_eq!(composition.duration_ms(), Some(6_000));
        assert_eq!(composition.output_frame_rate(), 24.0);

        let item = &composition.sequences[0].items[0];
        assert!(matches!(
            item.effects.last(),
            Some(Effect::Overlay(effect)) if effect.overlays.len() == 1
        ));
    }
}
