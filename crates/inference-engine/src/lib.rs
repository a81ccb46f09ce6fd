//! ONNX Inference Engine
//!
//! Loads ONNX models with tract and runs them on flat `f32` tensors. Used by
//! the face localizer and the eye-state classifier.

mod model;

pub use model::{ModelOutput, OnnxModel};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
}
