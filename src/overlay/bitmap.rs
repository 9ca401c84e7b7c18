use std::path::Path;

use image::imageops::FilterType;
use image::{GenericImageView, ImageError, RgbaImage};
use tracing::debug;

use crate::error::{DecodeError, EditorError, Result};
use crate::overlay::TextureOverlay;
use crate::types::{OverlaySettings, Size};

/// Overlay that draws the same bitmap on every frame
#[derive(Debug, Clone)]
pub struct StaticOverlay {
    bitmap: RgbaImage,
    settings: OverlaySettings,
}

impl StaticOverlay {
    pub fn new(bitmap: RgbaImage) -> Self {
        Self {
            bitmap,
            settings: OverlaySettings::default(),
        }
    }

    /// Load an image, down-sampled to fit within `bound`
    pub fn load_scaled<P: AsRef<Path>>(path: P, bound: Size) -> Result<Self> {
        Ok(Self::new(load_scaled_bitmap(path, bound)?))
    }

    pub fn with_settings(mut self, settings: OverlaySettings) -> Self {
        self.settings = settings;
        self
    }
}

impl TextureOverlay for StaticOverlay {
    fn name(&self) -> &str {
        "static"
    }

    fn bitmap(&mut self, _presentation_time_us: i64) -> &RgbaImage {
        &self.bitmap
    }

    fn texture_size(&self, _presentation_time_us: i64) -> Size {
        Size::new(self.bitmap.width(), self.bitmap.height())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn overlay_settings(&self, _presentation_time_us: i64) -> OverlaySettings {
        self.settings
    }
}

/// Integer down-sampling factor for an image of `source` size requested
/// within `bound`
///
/// Images already inside the bound are kept as-is. Otherwise the factor is
/// taken from the shorter side: height against the bound height for
/// landscape images, width against the bound width for portrait ones. The
/// rounded factor is then floored to a power of two, as Android's decoder
/// does with `inSampleSize`.
pub fn sample_size(source: Size, bound: Size) -> u32 {
    if source.width <= bound.width && source.height <= bound.height {
        return 1;
    }

    let factor = if source.width > source.height {
        source.height as f32 / bound.height as f32
    } else {
        source.width as f32 / bound.width as f32
    };

    let factor = (factor.round() as u32).max(1);
    1 << (u32::BITS - 1 - factor.leading_zeros())
}

/// Decode an image file and shrink it by [`sample_size`]
pub fn load_scaled_bitmap<P: AsRef<Path>>(path: P, bound: Size) -> Result<RgbaImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|e| match e {
        ImageError::IoError(io) => EditorError::Io(io),
        other => DecodeError::Malformed {
            reason: format!("{}: {}", path.display(), other),
        }
        .into(),
    })?;

    let (width, height) = image.dimensions();
    let sample = sample_size(Size::new(width, height), bound);
    if sample == 1 {
        return Ok(image.to_rgba8());
    }

    let target = Size::new((width / sample).max(1), (height / sample).max(1));
    debug!(
        "Down-sampling {:?} from {}x{} to {} (sample size {})",
        path.file_name().unwrap_or_default(),
        width,
        height,
        target,
        sample
    );

    Ok(image::imageops::resize(
        &image.to_rgba8(),
        target.width,
        target.height,
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_sample_size_within_bound() {
        assert_eq!(sample_size(Size::new(300, 400), Size::new(300, 400)), 1);
        assert_eq!(sample_size(Size::new(10, 10), Size::new(300, 400)), 1);
    }

    #[test]
    fn test_sample_size_portrait() {
        // width / bound width = 1080 / 300 = 3.6
        assert_eq!(sample_size(Size::new(1080, 1920), Size::new(300, 400)), 4);
    }

    #[test]
    fn test_sample_size_landscape() {
        // height / bound height = 1080 / 400 = 2.7, rounded to 3, floored to 2
        assert_eq!(sample_size(Size::new(1920, 1080), Size::new(300, 400)), 2);
    }

    #[test]
    fn test_sample_size_is_power_of_two() {
        // 2400 / 300 = 8 stays, 1800 / 300 = 6 drops to 4
        assert_eq!(sample_size(Size::new(2400, 3200), Size::new(300, 400)), 8);
        assert_eq!(sample_size(Size::new(1800, 2400), Size::new(300, 400)), 4);
        assert_eq!(sample_size(Size::new(1500, 2000), Size::new(300, 400)), 4);
    }

    #[test]
    fn test_sample_size_never_zero() {
        // Too wide but short: 100 / 400 rounds to 0
        assert_eq!(sample_size(Size::new(500, 100), Size::new(300, 400)), 1);
    }

    #[test]
    fn test_load_scaled_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sticker.png");
        RgbaImage::from_pixel(1200, 1600, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let overlay = StaticOverlay::load_scaled(&path, Size::new(300, 400)).unwrap();
        assert_eq!(overlay.texture_size(0), Size::new(300, 400));
    }

    #[test]
    fn test_load_missing_image_is_io() {
        let result = load_scaled_bitmap("/no/such/image.png", Size::new(300, 400));
        assert!(matches!(result, Err(EditorError::Io(_))));
    }

    #[test]
    fn test_load_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let result = load_scaled_bitmap(&path, Size::new(300, 400));
        assert!(matches!(result, Err(EditorError::Decode(DecodeError::Malformed { .. }))));
    }

    #[test]
    fn test_static_overlay_settings() {
        let settings = OverlaySettings::default().with_background_frame_anchor(0.8, -0.8);
        let mut overlay =
            StaticOverlay::new(RgbaImage::new(4, 4)).with_settings(settings);

        assert_eq!(overlay.overlay_settings(0), settings);
        assert_eq!(overlay.bitmap(123).dimensions(), (4, 4));
    }
}
