//! Runnable ONNX model wrapper

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::InferenceError;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// One output tensor, flattened in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ModelOutput {
    /// Number of scalar values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Optimized tract plan with a fixed `f32` input shape
pub struct OnnxModel {
    plan: Plan,
    input_shape: Vec<usize>,
    source: PathBuf,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("source", &self.source)
            .field("input_shape", &self.input_shape)
            .finish()
    }
}

impl OnnxModel {
    /// Load and optimize an ONNX model for the given input shape
    pub fn load(path: impl AsRef<Path>, input_shape: &[usize]) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX model {} (input {:?})", path.display(), input_shape);

        if !path.is_file() {
            return Err(InferenceError::ModelLoadError(format!(
                "{}: file not found",
                path.display()
            )));
        }

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape.to_vec()).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::ModelLoadError(format!("{}: {}", path.display(), e)))?;

        info!("Model {} loaded successfully", path.display());
        Ok(Self {
            plan,
            input_shape: input_shape.to_vec(),
            source: path.to_path_buf(),
        })
    }

    /// Wrap an already-built typed graph
    pub fn from_typed(model: TypedModel, input_shape: &[usize]) -> Result<Self, InferenceError> {
        let plan = model
            .into_runnable()
            .map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;
        Ok(Self {
            plan,
            input_shape: input_shape.to_vec(),
            source: PathBuf::from("<memory>"),
        })
    }

    /// Expected input shape
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Number of scalars the input tensor holds
    pub fn input_len(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Run the model on a row-major input buffer
    pub fn run(&self, input: &[f32]) -> Result<Vec<ModelOutput>, InferenceError> {
        if input.len() != self.input_len() {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?} ({} values)", self.input_shape, self.input_len()),
                actual: format!("{} values", input.len()),
            });
        }

        let start = Instant::now();
        let tensor = Tensor::from_shape(&self.input_shape, input)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = outputs
            .iter()
            .map(|value| {
                let view = value
                    .to_array_view::<f32>()
                    .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
                Ok(ModelOutput {
                    shape: view.shape().to_vec(),
                    data: view.iter().copied().collect(),
                })
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;

        debug!(
            "Inference on {} completed in {:?}",
            self.source.display(),
            start.elapsed()
        );
        Ok(outputs)
    }
}
