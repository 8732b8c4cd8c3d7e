//! TOML configuration for the daemon.
//!
//! Every field has a default matching the board the daemon was written for,
//! so running without a config file works out of the box.  A file only needs
//! the keys it overrides:
//!
//! ```toml
//! log_level = "debug"
//!
//! [capture]
//! device = "/dev/video1"
//! format = "YUYV"
//!
//! [hud]
//! pattern = "/data/hud/screen_{}.bmp"
//! ```
//!
//! The config file path is the daemon's first command-line argument.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vid_core::domain::overlay::DEFAULT_PICTURE_PATTERN;
use vid_core::{
    ActiveSource, OverlayCatalog, PixelFormat, BITMAP_PIXEL_DATA_OFFSET, HUD_NUM_OF_PICTURES,
};

use crate::application::capture::{CaptureSettings, MIN_CAPTURE_BUFFERS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Readiness wait timeout in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Source active at startup.
    #[serde(default)]
    pub initial_source: ActiveSource,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub route: RouteConfig,
    #[serde(default)]
    pub hud: HudConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputConfig {
    #[serde(default = "default_input_device")]
    pub device: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_device")]
    pub device: PathBuf,
    /// V4L2 input line the camera is wired to.
    #[serde(default = "default_input_line")]
    pub input_line: u32,
    #[serde(default = "default_pixel_format")]
    pub format: PixelFormat,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Raised to the streaming minimum if lower.
    #[serde(default = "default_min_buffers")]
    pub min_buffers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    #[serde(default = "default_display_device")]
    pub device: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    #[serde(default = "default_route_control")]
    pub control: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HudConfig {
    #[serde(default = "default_hud_device")]
    pub device: PathBuf,
    /// Asset path pattern; `{}` is replaced by the picture index.
    #[serde(default = "default_hud_pattern")]
    pub pattern: String,
    #[serde(default = "default_hud_count")]
    pub count: usize,
    /// Offset of pixel data inside each asset file.
    #[serde(default = "default_pixel_data_offset")]
    pub pixel_data_offset: usize,
}

/// Longest wait `poll(2)` accepts through the readiness waiter.
const MAX_TICK_MS: u64 = u16::MAX as u64;

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_tick_ms() -> u64 {
    2000
}
fn default_input_device() -> PathBuf {
    PathBuf::from("/dev/input/event1")
}
fn default_capture_device() -> PathBuf {
    PathBuf::from("/dev/video0")
}
fn default_input_line() -> u32 {
    1
}
fn default_pixel_format() -> PixelFormat {
    PixelFormat::Nv12
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_min_buffers() -> u32 {
    MIN_CAPTURE_BUFFERS
}
fn default_display_device() -> PathBuf {
    PathBuf::from("/dev/graphics/fb0")
}
fn default_route_control() -> PathBuf {
    PathBuf::from("/sys/class/video_output/LCD/state")
}
fn default_hud_device() -> PathBuf {
    PathBuf::from("/dev/graphics/fb4")
}
fn default_hud_pattern() -> String {
    DEFAULT_PICTURE_PATTERN.to_string()
}
fn default_hud_count() -> usize {
    HUD_NUM_OF_PICTURES
}
fn default_pixel_data_offset() -> usize {
    BITMAP_PIXEL_DATA_OFFSET
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tick_ms: default_tick_ms(),
            initial_source: ActiveSource::default(),
            input: InputConfig::default(),
            capture: CaptureConfig::default(),
            display: DisplayConfig::default(),
            route: RouteConfig::default(),
            hud: HudConfig::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: default_input_device(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_capture_device(),
            input_line: default_input_line(),
            format: default_pixel_format(),
            width: default_width(),
            height: default_height(),
            min_buffers: default_min_buffers(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            device: default_display_device(),
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            control: default_route_control(),
        }
    }
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            device: default_hud_device(),
            pattern: default_hud_pattern(),
            count: default_hud_count(),
            pixel_data_offset: default_pixel_data_offset(),
        }
    }
}

// ── Loading and derived settings ──────────────────────────────────────────────

impl DaemonConfig {
    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file at `path`, or returns the defaults when `path` is
    /// `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture resolution {}x{} is empty",
                self.capture.width, self.capture.height
            )));
        }
        if self.hud.count == 0 {
            return Err(ConfigError::Invalid("hud.count must be at least 1".into()));
        }
        if !self.hud.pattern.contains("{}") {
            return Err(ConfigError::Invalid(format!(
                "hud.pattern {:?} has no {{}} placeholder",
                self.hud.pattern
            )));
        }
        if self.tick_ms == 0 || self.tick_ms > MAX_TICK_MS {
            return Err(ConfigError::Invalid(format!(
                "tick_ms must be between 1 and {MAX_TICK_MS}, got {}",
                self.tick_ms
            )));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            input_line: self.capture.input_line,
            format: self.capture.format,
            width: self.capture.width,
            height: self.capture.height,
        }
    }

    pub fn overlay_catalog(&self) -> OverlayCatalog {
        OverlayCatalog::new(
            self.hud.pattern.clone(),
            self.hud.count,
            self.hud.pixel_data_offset,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_board_defaults() {
        // Arrange / Act
        let config = DaemonConfig::from_toml("").unwrap();

        // Assert
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.input.device, PathBuf::from("/dev/input/event1"));
        assert_eq!(config.capture.format, PixelFormat::Nv12);
        assert_eq!(config.hud.device, PathBuf::from("/dev/graphics/fb4"));
        assert_eq!(config.tick(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = DaemonConfig::from_toml(
            r#"
            initial_source = "internal"

            [capture]
            device = "/dev/video1"
            format = "YUYV"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.device, PathBuf::from("/dev/video1"));
        assert_eq!(config.capture.format, PixelFormat::Yuyv);
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.initial_source, ActiveSource::Internal);
    }

    #[test]
    fn test_pattern_without_placeholder_is_rejected() {
        let err = DaemonConfig::from_toml("[hud]\npattern = \"/boot/hud.bmp\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_tick_beyond_poll_range_is_rejected() {
        let err = DaemonConfig::from_toml("tick_ms = 65536").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = DaemonConfig::from_toml("tick_ms = 65535").unwrap();
        assert_eq!(config.tick(), Duration::from_millis(65535));
    }

    #[test]
    fn test_unknown_pixel_format_is_a_parse_error() {
        let err = DaemonConfig::from_toml("[capture]\nformat = \"MJPG\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        assert_eq!(DaemonConfig::load(None).unwrap(), DaemonConfig::default());
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = DaemonConfig::load(Some(Path::new("/nonexistent/vidservice.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_overlay_catalog_reflects_hud_section() {
        let config =
            DaemonConfig::from_toml("[hud]\npattern = \"/tmp/p{}.bmp\"\ncount = 2").unwrap();

        let catalog = config.overlay_catalog();

        assert_eq!(catalog.count(), 2);
        assert_eq!(catalog.path_for(1).unwrap(), PathBuf::from("/tmp/p1.bmp"));
        assert_eq!(catalog.pixel_data_offset(), 54);
    }
}
