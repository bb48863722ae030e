//! # Model Wrapper
//!
//! [`Model`] owns a loaded classifier and exposes a single forward pass that
//! returns one probability per label. The runtime behind it is reached through
//! the [`ClassifierBackend`] trait so the request pipeline can be exercised
//! without a model file; [`crate::onnx::OnnxBackend`] is the production backend.
//!
//! ## Thread Safety
//!
//! Inference takes `&self` and backends are `Send + Sync`, so one `Model`
//! is shared across all requests behind an `Arc` with no locking.

use crate::onnx::OnnxBackend;
use crate::preprocess::{ImageTensor, CHANNELS};
use dermalens_shared::error::{DermalensError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Documented batch size of the trained model, reported by introspection
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Static facts a backend reports about the graph it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescription {
    /// Input tensor shape, batch axis first
    pub input_shape: Vec<usize>,
    /// Output tensor shape, batch axis first
    pub output_shape: Vec<usize>,
    /// Number of scalars held in constant tensors of the decluttered graph
    pub total_params: u64,
    /// Number of computational nodes in the graph
    pub layers: usize,
}

/// A runtime capable of evaluating the classifier graph
pub trait ClassifierBackend: Send + Sync + fmt::Debug {
    /// Runs one forward pass and returns the raw output values
    ///
    /// The returned vector still carries the batch axis flattened in; for a
    /// batch of one it has exactly one value per label.
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>>;

    /// Shapes and size of the loaded graph
    fn describe(&self) -> BackendDescription;
}

/// Introspection record returned by the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Input tensor shape, batch axis first
    pub input_shape: Vec<usize>,
    /// Output tensor shape, batch axis first
    pub output_shape: Vec<usize>,
    /// Scalars in constant tensors after decluttering, folded constants included
    pub total_params: u64,
    /// Number of computational nodes
    pub layers: usize,
    /// Human-readable input size, e.g. `128x128x3`
    pub expected_input_size: String,
    /// Documented training batch size
    pub batch_size: usize,
}

/// A loaded classifier
pub struct Model {
    backend: Box<dyn ClassifierBackend>,
    path: PathBuf,
    description: BackendDescription,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("path", &self.path)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Loads an ONNX classifier from `path`
    ///
    /// The graph is specialised for an input of `(1, H, W, 3)` where
    /// `image_size` is `(W, H)`, and must produce `label_count` outputs.
    ///
    /// # Errors
    ///
    /// [`DermalensError::ModelLoad`] when the file is missing, is not a
    /// valid model, or its shapes do not match.
    pub fn load(path: impl AsRef<Path>, image_size: (u32, u32), label_count: usize) -> Result<Self> {
        let path = path.as_ref();
        info!(model_path = %path.display(), "Loading model");

        let backend = OnnxBackend::load(path, image_size, label_count)?;
        let model = Self::from_backend(backend, path);

        info!(
            model_path = %path.display(),
            total_params = model.description.total_params,
            layers = model.description.layers,
            "Model loaded successfully"
        );
        Ok(model)
    }

    /// Wraps an already constructed backend
    pub fn from_backend(backend: impl ClassifierBackend + 'static, path: impl AsRef<Path>) -> Self {
        let description = backend.describe();
        Self {
            backend: Box::new(backend),
            path: path.as_ref().to_path_buf(),
            description,
        }
    }

    /// Path the model was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of probabilities [`predict`](Self::predict) returns
    pub fn output_len(&self) -> usize {
        self.description.output_shape.last().copied().unwrap_or(0)
    }

    /// Runs one forward pass and returns a probability per label
    ///
    /// The batch axis is removed and the values are renormalised so they sum
    /// to 1.0 (see [`renormalize`]).
    ///
    /// # Errors
    ///
    /// [`DermalensError::Inference`] when the input shape is wrong, the
    /// runtime fails, or the output is empty, non-finite or of the wrong
    /// length.
    #[instrument(skip_all, fields(model_path = %self.path.display()))]
    pub fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        if input.shape()[..] != self.description.input_shape[..] {
            return Err(DermalensError::inference(
                format!(
                    "input shape {:?} does not match model input {:?}",
                    input.shape(),
                    self.description.input_shape
                ),
                None,
            ));
        }

        let raw = self.backend.forward(input)?;
        let expected = self.output_len();
        if raw.len() != expected {
            return Err(DermalensError::inference(
                format!("model produced {} values, expected {}", raw.len(), expected),
                None,
            ));
        }

        let probabilities = renormalize(&raw)?;
        debug!(outputs = probabilities.len(), "Forward pass complete");
        Ok(probabilities)
    }

    /// Read-only introspection of the loaded graph
    pub fn info(&self) -> ModelInfo {
        let d = &self.description;
        let expected_input_size = match d.input_shape.as_slice() {
            [_, h, w, c] => format!("{}x{}x{}", h, w, c),
            other => format!("{:?}", other),
        };
        ModelInfo {
            input_shape: d.input_shape.clone(),
            output_shape: d.output_shape.clone(),
            total_params: d.total_params,
            layers: d.layers,
            expected_input_size,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Expected input shape for an image of `(width, height)`
pub fn input_shape_for(image_size: (u32, u32)) -> Vec<usize> {
    vec![1, image_size.1 as usize, image_size.0 as usize, CHANNELS]
}

/// Turns raw model output into a probability distribution
///
/// Output already in `[0, 1]` (a softmax head) is divided by its sum to
/// absorb rounding drift. Anything else is treated as logits and passed
/// through a numerically stable softmax.
///
/// # Errors
///
/// [`DermalensError::Inference`] for empty or non-finite output.
pub fn renormalize(raw: &[f32]) -> Result<Vec<f32>> {
    if raw.is_empty() {
        return Err(DermalensError::inference("model produced no output", None));
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(DermalensError::inference(
            "model produced non-finite output",
            None,
        ));
    }

    let sum: f32 = raw.iter().sum();
    if sum > 0.0 && raw.iter().all(|v| (0.0..=1.0).contains(v)) {
        return Ok(raw.iter().map(|v| v / sum).collect());
    }

    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|v| v / total).collect())
}
