//! Driver Monitoring System (DMS)
//!
//! Real-time drowsiness analysis for a single driver:
//! - Face detection and 68-point landmark localization
//! - Eye crop normalization for the open/closed classifier
//! - Debounced face-loss and eyes-closed alert timers

pub mod analysis;
pub mod config;
pub mod detector;
pub mod landmarks;
pub mod normalizer;
pub mod onnx;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use alerting::AlertKind;
pub use analysis::{DmsAnalysis, EyePair, EyeReading, FaceAnalysis};
pub use config::{AlertConfig, DmsConfig, EyesTimerReset};
pub use detector::{EyeClassifier, FaceBox, FaceLocalizer};
pub use landmarks::{EyeSide, LandmarkSet, Point};
pub use normalizer::{normalize_eye, EyeRegion, NormalizedEyeCrop};
pub use onnx::{OnnxEyeClassifier, OnnxFaceLocalizer};
pub use state::{AlertTimers, EyeLabel, EyeScores, FrameObservation};

use camera_capture::{CameraError, VideoFrame};
use image::GrayImage;
use inference_engine::InferenceError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Expected 68 landmarks, got {0}")]
    LandmarkCount(usize),

    #[error("Landmark {index} has a non-finite coordinate")]
    NonFiniteLandmark { index: usize },

    #[error("Degenerate eye region: {0:?}")]
    DegenerateEyeRegion(EyeRegion),

    #[error("Unreadable frame: {0}")]
    Frame(#[from] CameraError),
}

impl From<InferenceError> for DmsError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::ModelLoadError(msg) => DmsError::ModelLoad(msg),
            other => DmsError::Inference(other.to_string()),
        }
    }
}

/// Driver monitoring module
pub struct DmsModule {
    config: DmsConfig,
    localizer: Box<dyn FaceLocalizer>,
    classifier: Box<dyn EyeClassifier>,
    timers: AlertTimers,
}

impl DmsModule {
    /// Create a DMS module backed by the configured ONNX models.
    ///
    /// Fails if any model cannot be loaded.
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        let localizer = OnnxFaceLocalizer::new(&config)?;
        let classifier = OnnxEyeClassifier::new(&config)?;
        Ok(Self::with_capabilities(
            config,
            Box::new(localizer),
            Box::new(classifier),
        ))
    }

    /// Create a DMS module with injected localizer and classifier
    pub fn with_capabilities(
        config: DmsConfig,
        localizer: Box<dyn FaceLocalizer>,
        classifier: Box<dyn EyeClassifier>,
    ) -> Self {
        Self {
            config,
            localizer,
            classifier,
            timers: AlertTimers::started_at(Duration::ZERO),
        }
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    pub fn timers(&self) -> AlertTimers {
        self.timers
    }

    /// Analyze a single frame. `now` is the time since the session started.
    ///
    /// An error means the whole frame could not be analyzed; the timers are
    /// left untouched. Failures for individual faces are absorbed.
    pub fn analyze(&mut self, frame: &VideoFrame, now: Duration) -> Result<DmsAnalysis, DmsError> {
        let gray = frame.to_grayscale()?;
        let faces = self.localizer.detect_faces(&gray)?;

        let faces: Vec<FaceAnalysis> = faces
            .into_iter()
            .map(|face| {
                let eyes = match self.analyze_face(&gray, &face) {
                    Ok(eyes) => Some(eyes),
                    Err(e) => {
                        warn!(
                            "Frame {}: face at ({:.0}, {:.0}) not scored: {}",
                            frame.sequence, face.x, face.y, e
                        );
                        None
                    }
                };
                FaceAnalysis { face, eyes }
            })
            .collect();

        let mut analysis = DmsAnalysis {
            sequence: frame.sequence,
            face_detected: !faces.is_empty(),
            faces,
            ..Default::default()
        };

        let (timers, alert) = self
            .timers
            .step(&analysis.observation(), now, &self.config.alert);
        self.timers = timers;

        analysis.alert = alert;
        analysis.face_absent_s = timers.face_absent_for(now).as_secs_f64();
        analysis.eyes_timer_s = timers.eyes_timer(now).as_secs_f64();

        debug!(
            "Frame {}: {} faces, alert={:?}",
            frame.sequence,
            analysis.faces.len(),
            analysis.alert
        );
        Ok(analysis)
    }

    fn analyze_face(&self, gray: &GrayImage, face: &FaceBox) -> Result<EyePair, DmsError> {
        let landmarks = self.localizer.locate_landmarks(gray, face)?;
        let threshold = self.config.alert.display_label_threshold;

        let read = |side: EyeSide| -> Result<EyeReading, DmsError> {
            let patch = normalize_eye(gray, &landmarks.eye(side), side)?;
            let openness = self.classifier.score_openness(&patch.crop)?;
            Ok(EyeReading {
                region: patch.region,
                openness,
                label: EyeLabel::from_score(openness, threshold),
            })
        };

        Ok(EyePair {
            left: read(EyeSide::Left)?,
            right: read(EyeSide::Right)?,
        })
    }

    /// Restart both timers (new streaming session)
    pub fn reset_state(&mut self, now: Duration) {
        self.timers = AlertTimers::started_at(now);
    }
}
