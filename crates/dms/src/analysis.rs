//! DMS analysis results

use alerting::AlertKind;
use serde::{Deserialize, Serialize};

use crate::detector::FaceBox;
use crate::normalizer::EyeRegion;
use crate::state::{EyeLabel, EyeScores, FrameObservation};

/// One classified eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeReading {
    /// Crop rectangle, also used for the overlay box
    pub region: EyeRegion,
    /// Openness score (0-1)
    pub openness: f32,
    /// Display label
    pub label: EyeLabel,
}

/// Both eyes of one face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePair {
    pub left: EyeReading,
    pub right: EyeReading,
}

impl EyePair {
    pub fn scores(&self) -> EyeScores {
        EyeScores::new(self.left.openness, self.right.openness)
    }
}

/// Per-face result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    pub face: FaceBox,

    /// Missing when landmarks, cropping or classification failed for this face
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes: Option<EyePair>,
}

/// Complete DMS analysis result for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Sequence number of the analyzed frame
    pub sequence: u32,

    /// Whether a face was detected
    pub face_detected: bool,

    /// Detected faces in localizer order
    pub faces: Vec<FaceAnalysis>,

    /// Alert fired on this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertKind>,

    /// Seconds since a face was last present
    pub face_absent_s: f64,

    /// Seconds on the eyes-closed timer
    pub eyes_timer_s: f64,
}

impl DmsAnalysis {
    /// Check if an alert fired on this frame
    pub fn has_alert(&self) -> bool {
        self.alert.is_some()
    }

    /// What the frame contributes to the alert timers
    pub fn observation(&self) -> FrameObservation {
        if self.faces.is_empty() {
            FrameObservation::NoFace
        } else {
            FrameObservation::Faces(
                self.faces
                    .iter()
                    .map(|f| f.eyes.as_ref().map(EyePair::scores))
                    .collect(),
            )
        }
    }

    /// First face with scored eyes
    pub fn primary_eyes(&self) -> Option<&EyePair> {
        self.faces.iter().find_map(|f| f.eyes.as_ref())
    }
}
