//! DMS configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the eyes-closed timer origin is moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyesTimerReset {
    /// Only a fired alert (eyes-closed or face-loss) restarts the timer
    #[default]
    OnAlert,
    /// Additionally restart it on every frame where the eyes are not both closed
    OnOpenEyes,
}

/// Alert timing and threshold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Seconds without a detected face before the face-loss alert fires
    pub face_loss_delay_s: f64,

    /// Seconds on the eyes timer before the eyes-closed alert fires
    pub eyes_closed_delay_s: f64,

    /// Both openness scores must be at or below this to count as closed
    pub eyes_closed_threshold: f32,

    /// Openness above this is labelled "Open" on the overlay (display only)
    pub display_label_threshold: f32,

    /// Eyes timer reset policy
    pub eyes_timer_reset: EyesTimerReset,

    /// Whether a face-loss alert also restarts the eyes timer
    pub face_loss_resets_eyes_timer: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            face_loss_delay_s: 3.0,
            eyes_closed_delay_s: 3.0,
            eyes_closed_threshold: 0.1,
            display_label_threshold: 0.5,
            eyes_timer_reset: EyesTimerReset::OnAlert,
            face_loss_resets_eyes_timer: true,
        }
    }
}

impl AlertConfig {
    pub fn face_loss_delay(&self) -> Duration {
        Duration::from_secs_f64(self.face_loss_delay_s.max(0.0))
    }

    pub fn eyes_closed_delay(&self) -> Duration {
        Duration::from_secs_f64(self.eyes_closed_delay_s.max(0.0))
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Face detection confidence threshold
    pub face_confidence: f32,

    /// IoU above which overlapping face boxes are suppressed
    pub nms_iou: f32,

    /// Model paths
    pub face_model_path: Option<PathBuf>,
    pub landmark_model_path: Option<PathBuf>,
    pub eye_model_path: Option<PathBuf>,

    /// Alert state machine settings
    pub alert: AlertConfig,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            face_confidence: 0.7,
            nms_iou: 0.3,
            face_model_path: None,
            landmark_model_path: None,
            eye_model_path: None,
            alert: AlertConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_behaviour() {
        let config = AlertConfig::default();
        assert_eq!(config.face_loss_delay(), Duration::from_secs(3));
        assert_eq!(config.eyes_closed_delay(), Duration::from_secs(3));
        assert_eq!(config.eyes_closed_threshold, 0.1);
        assert_eq!(config.display_label_threshold, 0.5);
        assert_eq!(config.eyes_timer_reset, EyesTimerReset::OnAlert);
        assert!(config.face_loss_resets_eyes_timer);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: AlertConfig =
            serde_json::from_str(r#"{"eyes_closed_delay_s": 2.5, "eyes_timer_reset": "on_open_eyes"}"#)
                .unwrap();
        assert_eq!(config.eyes_closed_delay(), Duration::from_millis(2500));
        assert_eq!(config.eyes_timer_reset, EyesTimerReset::OnOpenEyes);
        assert_eq!(config.face_loss_delay_s, 3.0);
    }

    #[test]
    fn test_negative_delay_clamps_to_zero() {
        let config = AlertConfig {
            face_loss_delay_s: -1.0,
            ..Default::default()
        };
        assert_eq!(config.face_loss_delay(), Duration::ZERO);
    }
}
