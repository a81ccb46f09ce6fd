//! Alerting System
//!
//! Provides the alert tone capability and per-session alert bookkeeping.

mod manager;
mod sink;

pub use manager::{AlertDispatcher, AlertState, AlertSummary};
pub use sink::{AlertSink, BellSink, NullSink, RecordingSink, ToneConfig};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition that triggered an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// No face for longer than the face-loss delay
    FaceLoss,
    /// Both eyes closed for longer than the eyes-closed delay
    EyesClosed,
}

impl AlertKind {
    pub const ALL: [AlertKind; 2] = [AlertKind::FaceLoss, AlertKind::EyesClosed];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FaceLoss => "face_loss",
            AlertKind::EyesClosed => "eyes_closed",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for kind in AlertKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
