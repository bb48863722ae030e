//! Deterministic classifier backends for tests and benchmarks.
//!
//! [`FixedOutputBackend`] returns the same output for every input, which
//! makes the HTTP pipeline testable without a model file on disk.

use crate::model::{input_shape_for, BackendDescription, ClassifierBackend};
use crate::preprocess::ImageTensor;
use dermalens_shared::error::{DermalensError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Backend that always produces the same raw output
#[derive(Debug, Clone)]
pub struct FixedOutputBackend {
    image_size: (u32, u32),
    output: Vec<f32>,
    failure: Option<String>,
    calls: Arc<AtomicU64>,
}

impl FixedOutputBackend {
    /// Accepts inputs of `image_size` and returns `output` unchanged
    pub fn new(image_size: (u32, u32), output: Vec<f32>) -> Self {
        Self {
            image_size,
            output,
            failure: None,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes every forward pass fail with `message`
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Shared counter of forward passes, readable after the backend is moved
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }
}

impl ClassifierBackend for FixedOutputBackend {
    fn forward(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.failure {
            Some(message) => Err(DermalensError::inference(message.clone(), None)),
            None => Ok(self.output.clone()),
        }
    }

    fn describe(&self) -> BackendDescription {
        BackendDescription {
            input_shape: input_shape_for(self.image_size),
            output_shape: vec![1, self.output.len()],
            total_params: 0,
            layers: 0,
        }
    }
}
