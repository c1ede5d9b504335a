//! Configuration management for uvccamera
//!
//! Provides loading and saving of session defaults: the stream configuration
//! applied on connect, control warm-up, event delivery and the recording pump.

use crate::errors::UvcError;
use crate::recording::StreamKind;
use crate::types::{
    FrameFormat, StreamConfig, DEFAULT_BANDWIDTH, DEFAULT_PREVIEW_HEIGHT, DEFAULT_PREVIEW_MAX_FPS,
    DEFAULT_PREVIEW_MIN_FPS, DEFAULT_PREVIEW_WIDTH,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UvcCameraConfig {
    pub preview: PreviewConfig,
    pub controls: ControlsConfig,
    pub events: EventsConfig,
    pub recording: RecordingConfig,
}

/// How `current_preview_size` matches catalog entries against the active
/// stream size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewSizeMatch {
    /// First entry whose width or height equals the stream's.
    #[default]
    WidthOrHeight,
    /// First entry whose width and height both equal the stream's.
    Exact,
}

impl PreviewSizeMatch {
    pub fn matches(self, size: (u32, u32), width: u32, height: u32) -> bool {
        match self {
            PreviewSizeMatch::WidthOrHeight => size.0 == width || size.1 == height,
            PreviewSizeMatch::Exact => size.0 == width && size.1 == height,
        }
    }
}

/// Elementary streams a recording is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingTracks {
    Video,
    #[default]
    VideoAndAudio,
    Audio,
}

impl RecordingTracks {
    pub fn expects(self, kind: StreamKind) -> bool {
        match self {
            RecordingTracks::Video => kind == StreamKind::Video,
            RecordingTracks::VideoAndAudio => true,
            RecordingTracks::Audio => kind == StreamKind::Audio,
        }
    }
}

/// Stream configuration applied right after connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
    pub min_fps: u32,
    pub max_fps: u32,
    pub frame_format: FrameFormat,
    /// USB bandwidth share requested from the driver (0.0, 1.0]
    pub bandwidth_factor: f32,
    pub size_match: PreviewSizeMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Fetch support masks and every control range during connect
    pub warm_on_connect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Upper bound on waiting for running frame callbacks when the frame
    /// listener is cleared
    pub callback_drain_timeout_ms: u64,
    /// Capacity of queues built with `frame_channel`
    pub frame_queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Tracks that must be registered before the sink starts
    pub tracks: RecordingTracks,
    /// Skip codec configuration samples instead of writing them as data
    pub skip_codec_config: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_PREVIEW_WIDTH,
            height: DEFAULT_PREVIEW_HEIGHT,
            min_fps: DEFAULT_PREVIEW_MIN_FPS,
            max_fps: DEFAULT_PREVIEW_MAX_FPS,
            frame_format: FrameFormat::Yuyv,
            bandwidth_factor: DEFAULT_BANDWIDTH,
            size_match: PreviewSizeMatch::WidthOrHeight,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self { warm_on_connect: true }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            callback_drain_timeout_ms: 500,
            frame_queue_capacity: 4,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            tracks: RecordingTracks::VideoAndAudio,
            skip_codec_config: true,
        }
    }
}

impl PreviewConfig {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.width, self.height)
            .with_fps(self.min_fps, self.max_fps)
            .with_format(self.frame_format)
            .with_bandwidth(self.bandwidth_factor)
    }
}

impl EventsConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_drain_timeout_ms)
    }
}

impl UvcCameraConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, UvcError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| UvcError::Config(format!("Failed to read config file: {}", e)))?;

        let config: UvcCameraConfig = toml::from_str(&contents)
            .map_err(|e| UvcError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), UvcError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    UvcError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| UvcError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| UvcError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("uvccamera.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        let preview = &self.preview;
        if preview.width == 0 || preview.height == 0 {
            return Err("Invalid preview resolution".to_string());
        }
        if preview.min_fps == 0 || preview.min_fps > preview.max_fps {
            return Err("Preview fps range must satisfy 1 <= min_fps <= max_fps".to_string());
        }
        if !(preview.bandwidth_factor > 0.0 && preview.bandwidth_factor <= 1.0) {
            return Err("Bandwidth factor must be in (0.0, 1.0]".to_string());
        }
        if self.events.frame_queue_capacity == 0 {
            return Err("Frame queue capacity must be at least 1".to_string());
        }
        Ok(())
    }
}
