use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    types::{AudioMimeType, Size, VideoMimeType},
};

/// Main configuration for clip-composer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output canvas, encoders and destination
    pub output: OutputConfig,

    /// Session behaviour (progress polling)
    pub session: SessionConfig,

    /// Split-screen layout job
    pub layout: LayoutJobConfig,

    /// Sequential timeline job
    pub timeline: TimelineJobConfig,

    /// Still image + animated filter job
    pub animated_filter: AnimatedFilterJobConfig,

    /// External ffmpeg backend
    pub ffmpeg: FfmpegConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.session.validate()?;
        self.layout.validate()?;
        self.timeline.validate()?;
        self.animated_filter.validate()?;
        self.ffmpeg.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn check_size(key: &str, size: Size) -> Result<()> {
    if size.is_empty() {
        return Err(invalid(key, size).into());
    }
    Ok(())
}

fn check_frame_rate(key: &str, fps: f32) -> Result<()> {
    if !(fps > 0.0 && fps <= 240.0) {
        return Err(invalid(key, fps).into());
    }
    Ok(())
}

/// Output canvas and encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Canvas every job renders to
    pub size: Size,

    pub video_mime_type: VideoMimeType,

    pub audio_mime_type: AudioMimeType,

    /// Extension of the temporary output file, without the dot
    pub container_extension: String,

    /// Where output files are created (system temp directory when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            size: Size::portrait_hd(),
            video_mime_type: VideoMimeType::H264,
            audio_mime_type: AudioMimeType::Aac,
            container_extension: "mp4".to_string(),
            directory: None,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        check_size("output.size", self.size)?;

        let ext = self.container_extension.as_str();
        if ext.is_empty() || ext.starts_with('.') || ext.contains(std::path::is_separator) {
            return Err(invalid("output.container_extension", ext).into());
        }

        Ok(())
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between two progress queries
    pub progress_interval_ms: u64,

    /// Directory picked assets are staged into before decoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_directory: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 500,
            staging_directory: None,
        }
    }
}

impl SessionConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(invalid("session.progress_interval_ms", self.progress_interval_ms).into());
        }
        Ok(())
    }
}

/// A clip range in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRangeMs {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl ClipRangeMs {
    pub const fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.end_ms <= self.start_ms {
            return Err(invalid(key, format!("{}-{}", self.start_ms, self.end_ms)).into());
        }
        Ok(())
    }
}

/// Split-screen layout job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutJobConfig {
    pub video1_clip: ClipRangeMs,

    pub video2_clip: ClipRangeMs,

    /// Size each video is cropped to before placement
    pub tile_size: Size,

    /// Target frame rate of the frame-drop effect
    pub frame_rate: f32,

    /// Bound the static image overlay is down-sampled to
    pub image_bound: Size,
}

impl Default for LayoutJobConfig {
    fn default() -> Self {
        Self {
            video1_clip: ClipRangeMs::new(10_000, 30_000),
            video2_clip: ClipRangeMs::new(0, 20_000),
            tile_size: Size::new(1080, 960),
            frame_rate: 30.0,
            image_bound: Size::new(300, 400),
        }
    }
}

impl LayoutJobConfig {
    fn validate(&self) -> Result<()> {
        self.video1_clip.validate("layout.video1_clip")?;
        self.video2_clip.validate("layout.video2_clip")?;
        check_size("layout.tile_size", self.tile_size)?;
        check_size("layout.image_bound", self.image_bound)?;
        check_frame_rate("layout.frame_rate", self.frame_rate)?;
        Ok(())
    }
}

/// Sequential timeline job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineJobConfig {
    /// Length of each video segment
    pub video_duration_ms: u64,

    pub video1_start_ms: u64,

    pub video2_start_ms: u64,

    /// How long the still image is held after the videos
    pub image_duration_ms: u64,

    pub image_frame_rate: u32,

    pub frame_rate: f32,
}

impl Default for TimelineJobConfig {
    fn default() -> Self {
        Self {
            video_duration_ms: 20_000,
            video1_start_ms: 10_000,
            video2_start_ms: 0,
            image_duration_ms: 5_000,
            image_frame_rate: 30,
            frame_rate: 30.0,
        }
    }
}

impl TimelineJobConfig {
    fn validate(&self) -> Result<()> {
        if self.video_duration_ms == 0 {
            return Err(invalid("timeline.video_duration_ms", self.video_duration_ms).into());
        }
        if self.image_duration_ms == 0 {
            return Err(invalid("timeline.image_duration_ms", self.image_duration_ms).into());
        }
        check_frame_rate("timeline.image_frame_rate", self.image_frame_rate as f32)?;
        check_frame_rate("timeline.frame_rate", self.frame_rate)?;
        Ok(())
    }
}

/// Animated filter job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedFilterJobConfig {
    pub image_duration_ms: u64,

    pub image_frame_rate: u32,
}

impl Default for AnimatedFilterJobConfig {
    fn default() -> Self {
        Self {
            image_duration_ms: 6_000,
            image_frame_rate: 24,
        }
    }
}

impl AnimatedFilterJobConfig {
    fn validate(&self) -> Result<()> {
        if self.image_duration_ms == 0 {
            return Err(invalid("animated_filter.image_duration_ms", self.image_duration_ms).into());
        }
        check_frame_rate("animated_filter.image_frame_rate", self.image_frame_rate as f32)?;
        Ok(())
    }
}

/// ffmpeg backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Program name or path of the ffmpeg binary
    pub binary: PathBuf,

    /// Threads used to encode rendered overlay frames
    pub render_threads: usize,

    /// x264/x265 constant rate factor
    pub crf: u8,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            render_threads: num_cpus::get(),
            crf: 23,
        }
    }
}

impl FfmpegConfig {
    fn validate(&self) -> Result<()> {
        if self.render_threads == 0 {
            return Err(invalid("ffmpeg.render_threads", self.render_threads).into());
        }
        if self.crf > 51 {
            return Err(invalid("ffmpeg.crf", self.crf).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.output.directory = Some(dir.path().to_path_buf());
        original_config.timeline.image_duration_ms = 7_500;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.output.size, Size::portrait_hd());
        assert_eq!(loaded_config.output.video_mime_type, VideoMimeType::H264);
        assert_eq!(loaded_config.output.directory.as_deref(), Some(dir.path()));
        assert_eq!(loaded_config.timeline.image_duration_ms, 7_500);
        assert_eq!(loaded_config.session.progress_interval_ms, 500);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[session]\nprogress_interval_ms = 250\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.session.progress_interval(), Duration::from_millis(250));
        assert_eq!(config.layout.video1_clip, ClipRangeMs::new(10_000, 30_000));
        assert_eq!(config.animated_filter.image_frame_rate, 24);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::EditorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_clip_range() {
        let mut config = Config::default();
        config.layout.video2_clip = ClipRangeMs::new(5_000, 5_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_extension() {
        let mut config = Config::default();
        config.output.container_extension = ".mp4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = Config::default();
        config.session.progress_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
