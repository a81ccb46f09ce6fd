//! Service configuration
//!
//! Layers, lowest precedence first: built-in defaults, the TOML file named by
//! `DROWSY_CONFIG` (default `config/drowsy-monitor.toml`, optional), then
//! `DROWSY__SECTION__KEY` environment variables.

use alerting::ToneConfig;
use camera_capture::CameraConfig;
use config::{Config, Environment, File, FileFormat};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ApiError;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "DROWSY_CONFIG";

/// Used when `DROWSY_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/drowsy-monitor.toml";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// HTTP server and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub addr: String,
    /// Max tracing level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// JPEG quality of streamed frames (1-100)
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            jpeg_quality: 80,
        }
    }
}

/// Complete service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub dms: DmsConfig,
    pub tone: ToneConfig,
}

impl Settings {
    /// Load from the default layers
    pub fn load() -> Result<Self, ApiError> {
        match std::env::var_os(CONFIG_PATH_VAR) {
            // An explicitly named file must exist
            Some(path) => Self::load_from(Path::new(&path), true),
            None => Self::load_from(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Load with `path` as the file layer
    pub fn load_from(path: &Path, required: bool) -> Result<Self, ApiError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(PathBuf::from(path)).format(FileFormat::Toml).required(required))
            .add_source(Environment::with_prefix("DROWSY").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a TOML document without the file or environment layers
    pub fn from_toml(toml: &str) -> Result<Self, ApiError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ApiError> {
        if !(self.camera.frame_scale.is_finite() && self.camera.frame_scale > 0.0) {
            return Err(ApiError::InvalidConfig(format!(
                "camera.frame_scale must be positive, got {}",
                self.camera.frame_scale
            )));
        }
        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err(ApiError::InvalidConfig(format!(
                "server.jpeg_quality must be in 1..=100, got {}",
                self.server.jpeg_quality
            )));
        }
        let alert = &self.dms.alert;
        for (name, delay) in [
            ("face_loss_delay_s", alert.face_loss_delay_s),
            ("eyes_closed_delay_s", alert.eyes_closed_delay_s),
        ] {
            if !(delay.is_finite() && delay >= 0.0) {
                return Err(ApiError::InvalidConfig(format!(
                    "dms.alert.{name} must be a non-negative number of seconds, got {delay}"
                )));
            }
        }
        for (name, value) in [
            ("dms.face_confidence", self.dms.face_confidence),
            ("dms.nms_iou", self.dms.nms_iou),
            ("dms.alert.eyes_closed_threshold", alert.eyes_closed_threshold),
            ("dms.alert.display_label_threshold", alert.display_label_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ApiError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}
