use serde::{Deserialize, Serialize};

/// Width and height of a frame, canvas or texture in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Portrait 1080p, the canvas every built-in job renders to
    pub const fn portrait_hd() -> Self {
        Self::new(1080, 1920)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Placement of one compositor input (or overlay) on its background
///
/// Anchors are in normalized device coordinates: `(-1, -1)` is the
/// bottom-left corner, `(1, 1)` the top-right, `(0, 0)` the center. The
/// overlay anchor point is pinned onto the background anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlaySettings {
    pub overlay_frame_anchor: (f32, f32),
    pub background_frame_anchor: (f32, f32),
    pub scale: (f32, f32),
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            overlay_frame_anchor: (0.0, 0.0),
            background_frame_anchor: (0.0, 0.0),
            scale: (1.0, 1.0),
        }
    }
}

impl OverlaySettings {
    pub fn with_overlay_frame_anchor(mut self, x: f32, y: f32) -> Self {
        self.overlay_frame_anchor = (x, y);
        self
    }

    pub fn with_background_frame_anchor(mut self, x: f32, y: f32) -> Self {
        self.background_frame_anchor = (x, y);
        self
    }

    pub fn with_scale(mut self, x: f32, y: f32) -> Self {
        self.scale = (x, y);
        self
    }

    /// Size of the overlay once `scale` is applied
    pub fn scaled_size(&self, overlay: Size) -> Size {
        Size::new(
            (overlay.width as f32 * self.scale.0).round().max(0.0) as u32,
            (overlay.height as f32 * self.scale.1).round().max(0.0) as u32,
        )
    }

    /// Top-left pixel position of `overlay` on `background`
    pub fn position(&self, background: Size, overlay: Size) -> (i64, i64) {
        let overlay = self.scaled_size(overlay);

        let (bg_x, bg_y) = ndc_to_pixels(self.background_frame_anchor, background);
        let (ov_x, ov_y) = ndc_to_pixels(self.overlay_frame_anchor, overlay);

        ((bg_x - ov_x).round() as i64, (bg_y - ov_y).round() as i64)
    }
}

// NDC has y pointing up, pixel space has y pointing down.
fn ndc_to_pixels(anchor: (f32, f32), size: Size) -> (f32, f32) {
    let x = (anchor.0.clamp(-1.0, 1.0) + 1.0) / 2.0 * size.width as f32;
    let y = (1.0 - anchor.1.clamp(-1.0, 1.0)) / 2.0 * size.height as f32;
    (x, y)
}

/// Output video codec, identified by MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoMimeType {
    #[serde(rename = "video/avc")]
    H264,
    #[serde(rename = "video/hevc")]
    H265,
    #[serde(rename = "video/x-vnd.on2.vp9")]
    Vp9,
}

impl VideoMimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "video/avc",
            Self::H265 => "video/hevc",
            Self::Vp9 => "video/x-vnd.on2.vp9",
        }
    }
}

/// Output audio codec, identified by MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMimeType {
    #[serde(rename = "audio/mp4a-latm")]
    Aac,
    #[serde(rename = "audio/opus")]
    Opus,
}

impl AudioMimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aac => "audio/mp4a-latm",
            Self::Opus => "audio/opus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_bottom_half() {
        // Top-left corner of the overlay pinned to the middle of the left edge
        let settings = OverlaySettings::default()
            .with_overlay_frame_anchor(-1.0, 1.0)
            .with_background_frame_anchor(-1.0, 0.0);

        let pos = settings.position(Size::portrait_hd(), Size::new(1080, 960));
        assert_eq!(pos, (0, 960));
    }

    #[test]
    fn test_anchor_top_half() {
        let settings = OverlaySettings::default()
            .with_overlay_frame_anchor(-1.0, -1.0)
            .with_background_frame_anchor(-1.0, 0.0);

        let pos = settings.position(Size::portrait_hd(), Size::new(1080, 960));
        assert_eq!(pos, (0, 0));
    }

    #[test]
    fn test_default_settings_center_overlay() {
        let pos = OverlaySettings::default().position(Size::portrait_hd(), Size::new(300, 400));
        assert_eq!(pos, (390, 760));
    }

    #[test]
    fn test_scale_applies_before_anchoring() {
        let settings = OverlaySettings::default().with_scale(0.5, 0.5);
        assert_eq!(settings.scaled_size(Size::new(300, 400)), Size::new(150, 200));
        assert_eq!(
            settings.position(Size::new(1000, 1000), Size::new(300, 400)),
            (425, 400)
        );
    }
}
