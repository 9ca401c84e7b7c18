use std::fmt;
use std::path::{Path, PathBuf};

use crate::overlay::TextureOverlay;
use crate::types::{AudioMimeType, OverlaySettings, Size, VideoMimeType};

/// Sub-interval of a media source, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClippingConfiguration {
    pub start_ms: u64,
    /// `None` plays until the end of the source
    pub end_ms: Option<u64>,
}

impl ClippingConfiguration {
    pub const fn new(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms: Some(end_ms),
        }
    }

    pub fn is_unclipped(&self) -> bool {
        self.start_ms == 0 && self.end_ms.is_none()
    }

    /// Clipped length, unknown when the clip runs to the end of the source
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_ms.map(|end| end.saturating_sub(self.start_ms))
    }
}

/// Kind of source, guessed from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
    Audio,
}

/// A source file plus the range of it to use
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub path: PathBuf,
    pub clipping: ClippingConfiguration,
}

impl MediaItem {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            clipping: ClippingConfiguration::default(),
        }
    }

    pub fn with_clipping(mut self, clipping: ClippingConfiguration) -> Self {
        self.clipping = clipping;
        self
    }

    pub fn kind(&self) -> MediaKind {
        media_kind(&self.path)
    }
}

fn media_kind(path: &Path) -> MediaKind {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match ext.as_deref() {
        Some("jpg" | "jpeg" | "png" | "bmp" | "webp" | "gif" | "tiff") => MediaKind::Image,
        Some("mp3" | "aac" | "m4a" | "wav" | "flac" | "ogg" | "opus") => MediaKind::Audio,
        _ => MediaKind::Video,
    }
}

/// How a frame is fitted into a presentation size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Fit inside, letterboxing the rest
    ScaleToFit,
    /// Fill completely, cropping what overflows
    ScaleToFitWithCrop,
    /// Fill completely, ignoring aspect ratio
    StretchToFit,
}

/// Overlays drawn on top of every frame
pub struct OverlayEffect {
    pub overlays: Vec<Box<dyn TextureOverlay>>,
}

impl OverlayEffect {
    pub fn new(overlays: Vec<Box<dyn TextureOverlay>>) -> Self {
        Self { overlays }
    }

    pub fn single<O: TextureOverlay + 'static>(overlay: O) -> Self {
        Self::new(vec![Box::new(overlay)])
    }
}

impl fmt::Debug for OverlayEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.overlays.iter().map(|o| o.name()).collect();
        f.debug_struct("OverlayEffect").field("overlays", &names).finish()
    }
}

/// Video effect applied to an item or to the whole composition
#[derive(Debug)]
pub enum Effect {
    /// Resize frames to `size`
    Presentation { size: Size, layout: Layout },
    /// Drop frames to reach `target_fps`
    FrameDrop { target_fps: f32 },
    Overlay(OverlayEffect),
}

impl Effect {
    pub fn presentation(width: u32, height: u32, layout: Layout) -> Self {
        Self::Presentation {
            size: Size::new(width, height),
            layout,
        }
    }

    pub fn frame_drop(target_fps: f32) -> Self {
        Self::FrameDrop { target_fps }
    }
}

/// A media item with its edits
#[derive(Debug)]
pub struct EditedMediaItem {
    pub media_item: MediaItem,
    pub remove_audio: bool,
    /// How long a still image is shown, in microseconds
    pub duration_us: Option<u64>,
    /// Frame rate a still image is rendered at
    pub frame_rate: Option<u32>,
    pub effects: Vec<Effect>,
}

impl EditedMediaItem {
    pub fn new(media_item: MediaItem) -> Self {
        Self {
            media_item,
            remove_audio: false,
            duration_us: None,
            frame_rate: None,
            effects: Vec::new(),
        }
    }

    pub fn with_remove_audio(mut self, remove_audio: bool) -> Self {
        self.remove_audio = remove_audio;
        self
    }

    pub fn with_duration_us(mut self, duration_us: u64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_effects(mut self, effects: Vec<Effect>) -> Self {
        self.effects = effects;
        self
    }

    /// Presented duration: the image hold time, else the clipped length
    pub fn duration_ms(&self) -> Option<u64> {
        match self.duration_us {
            Some(us) => Some(us / 1_000),
            None => self.media_item.clipping.duration_ms(),
        }
    }

    pub fn has_audio(&self) -> bool {
        !self.remove_audio && self.media_item.kind() != MediaKind::Image
    }
}

/// Items played one after another
#[derive(Debug)]
pub struct Sequence {
    pub items: Vec<EditedMediaItem>,
    /// Repeat to cover the length of the longest non-looping sequence
    pub looping: bool,
}

impl Sequence {
    pub fn new(items: Vec<EditedMediaItem>) -> Self {
        Self {
            items,
            looping: false,
        }
    }

    pub fn looping(items: Vec<EditedMediaItem>) -> Self {
        Self {
            items,
            looping: true,
        }
    }

    /// Sum of item durations, unknown if any item's is
    pub fn duration_ms(&self) -> Option<u64> {
        self.items.iter().map(EditedMediaItem::duration_ms).sum()
    }

    /// Whether any item produces frames
    pub fn has_video(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.media_item.kind() != MediaKind::Audio)
    }
}

/// Output size and per-input placement of a multi-sequence composition
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCompositorSettings {
    pub output_size: Size,
    /// Indexed by input (sequence) id; missing entries use the default
    pub input_settings: Vec<OverlaySettings>,
}

impl VideoCompositorSettings {
    pub fn new(output_size: Size) -> Self {
        Self {
            output_size,
            input_settings: Vec::new(),
        }
    }

    pub fn with_input_settings(mut self, settings: Vec<OverlaySettings>) -> Self {
        self.input_settings = settings;
        self
    }

    pub fn overlay_settings(&self, input_id: usize) -> OverlaySettings {
        self.input_settings
            .get(input_id)
            .copied()
            .unwrap_or_default()
    }
}

/// Encoders the output is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub video_mime_type: VideoMimeType,
    pub audio_mime_type: AudioMimeType,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_mime_type: VideoMimeType::H264,
            audio_mime_type: AudioMimeType::Aac,
        }
    }
}

/// Complete description of one export job
///
/// Sequence 0 is input 0 of the compositor and is drawn on top.
#[derive(Debug)]
pub struct Composition {
    pub sequences: Vec<Sequence>,
    pub effects: Vec<Effect>,
    pub compositor: VideoCompositorSettings,
    pub encoder: EncoderSettings,
}

impl Composition {
    pub fn new(sequences: Vec<Sequence>, output_size: Size) -> Self {
        Self {
            sequences,
            effects: Vec::new(),
            compositor: VideoCompositorSettings::new(output_size),
            encoder: EncoderSettings::default(),
        }
    }

    pub fn with_effects(mut self, effects: Vec<Effect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_compositor(mut self, compositor: VideoCompositorSettings) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderSettings) -> Self {
        self.encoder = encoder;
        self
    }

    /// Nominal output duration
    ///
    /// The longest non-looping sequence; looping sequences repeat to match
    /// it. When every sequence loops, the longest one wins.
    pub fn duration_ms(&self) -> Option<u64> {
        let fixed: Vec<&Sequence> = self.sequences.iter().filter(|s| !s.looping).collect();
        let candidates = if fixed.is_empty() {
            self.sequences.iter().collect()
        } else {
            fixed
        };

        candidates
            .into_iter()
            .map(Sequence::duration_ms)
            .collect::<Option<Vec<u64>>>()?
            .into_iter()
            .max()
    }

    /// Frame rate of the output
    ///
    /// A composition-level frame drop wins, then the highest per-item frame
    /// drop or image frame rate, then 30.
    pub fn output_frame_rate(&self) -> f32 {
        if let Some(fps) = frame_drop_target(&self.effects) {
            return fps;
        }

        self.sequences
            .iter()
            .flat_map(|s| s.items.iter())
            .filter_map(|item| {
                frame_drop_target(&item.effects).or(item.frame_rate.map(|fps| fps as f32))
            })
            .fold(None, |best: Option<f32>, fps| Some(best.map_or(fps, |b| b.max(fps))))
            .unwrap_or(30.0)
    }
}

fn frame_drop_target(effects: &[Effect]) -> Option<f32> {
    effects.iter().find_map(|effect| match effect {
        Effect::FrameDrop { target_fps } => Some(*target_fps),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(path: &str, start: u64, end: u64) -> EditedMediaItem {
        EditedMediaItem::new(
            MediaItem::new(path).with_clipping(ClippingConfiguration::new(start, end)),
        )
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaItem::new("a.MP4").kind(), MediaKind::Video);
        assert_eq!(MediaItem::new("b.jpeg").kind(), MediaKind::Image);
        assert_eq!(MediaItem::new("c.m4a").kind(), MediaKind::Audio);
        assert_eq!(MediaItem::new("no_extension").kind(), MediaKind::Video);
    }

    #[test]
    fn test_unknown_end_makes_duration_unknown() {
        let item = EditedMediaItem::new(MediaItem::new("a.mp4"));
        assert_eq!(item.duration_ms(), None);
        assert!(item.media_item.clipping.is_unclipped());

        let sequence = Sequence::new(vec![clip("b.mp4", 0, 1_000), item]);
        assert_eq!(sequence.duration_ms(), None);
    }

    #[test]
    fn test_image_hold_time_wins_over_clipping() {
        let item = EditedMediaItem::new(MediaItem::new("still.png")).with_duration_us(5_000_000);
        assert_eq!(item.duration_ms(), Some(5_000));
        assert!(!item.has_audio());
    }

    #[test]
    fn test_looping_sequence_follows_longest_fixed() {
        let composition = Composition::new(
            vec![
                Sequence::new(vec![clip("a.mp4", 0, 12_000)]),
                Sequence::looping(vec![clip("b.mp4", 0, 3_000)]),
                Sequence::looping(vec![clip("c.mp4", 0, 40_000)]),
            ],
            Size::portrait_hd(),
        );
        assert_eq!(composition.duration_ms(), Some(12_000));
    }

    #[test]
    fn test_all_looping_uses_longest() {
        let composition = Composition::new(
            vec![
                Sequence::looping(vec![clip("a.mp4", 0, 2_000)]),
                Sequence::looping(vec![clip("b.mp4", 500, 4_000)]),
            ],
            Size::portrait_hd(),
        );
        assert_eq!(composition.duration_ms(), Some(3_500));
    }

    #[test]
    fn test_output_frame_rate() {
        let composition = Composition::new(
            vec![Sequence::new(vec![
                EditedMediaItem::new(MediaItem::new("still.png"))
                    .with_duration_us(1_000_000)
                    .with_frame_rate(24),
            ])],
            Size::portrait_hd(),
        );
        assert_eq!(composition.output_frame_rate(), 24.0);

        let composition = composition.with_effects(vec![Effect::frame_drop(15.0)]);
        assert_eq!(composition.output_frame_rate(), 15.0);

        let empty = Composition::new(vec![], Size::portrait_hd());
        assert_eq!(empty.output_frame_rate(), 30.0);
        assert_eq!(empty.duration_ms(), None);
    }

    #[test]
    fn test_compositor_settings_default_for_unknown_input() {
        let settings = VideoCompositorSettings::new(Size::portrait_hd()).with_input_settings(vec![
            OverlaySettings::default().with_overlay_frame_anchor(-1.0, 1.0),
        ]);
        assert_eq!(settings.overlay_settings(0).overlay_frame_anchor, (-1.0, 1.0));
        assert_eq!(settings.overlay_settings(7), OverlaySettings::default());
    }
}
