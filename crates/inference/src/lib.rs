//! # Dermalens Inference
//!
//! The request-independent half of the Dermalens pipeline: image
//! preprocessing, the model wrapper and prediction formatting.
//!
//! ## Features
//!
//! - **Preprocessing**: any supported image format to a `(1, 128, 128, 3)` tensor
//! - **ONNX Runtime**: pure-Rust CPU inference through tract
//! - **Runtime Seam**: the [`ClassifierBackend`] trait decouples the pipeline from tract
//! - **Formatting**: ranked class probabilities shaped for the HTTP response
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dermalens_inference::{
//!     disease_labels, preprocess_image, Model, PredictionResult, DEFAULT_IMAGE_SIZE,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let labels = disease_labels();
//! let model = Model::load("models/skin_disease_classification_model.onnx", DEFAULT_IMAGE_SIZE, labels.len())?;
//!
//! let tensor = preprocess_image(&std::fs::read("lesion.jpg")?, DEFAULT_IMAGE_SIZE)?;
//! let probabilities = model.predict(&tensor)?;
//! let result = PredictionResult::from_probabilities(&labels, &probabilities)?;
//! println!("{}", result.top().label);
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::must_use_candidate,
    clippy::uninlined_format_args,
    clippy::missing_const_for_fn
)]

pub mod formatter;
pub mod labels;
pub mod model;
pub mod onnx;
pub mod preprocess;
pub mod testing;

pub use formatter::{
    ClassProbability, PredictionResponse, PredictionResult, RankedEntry,
    DEFAULT_CONFIDENCE_THRESHOLD, TOP_N,
};
pub use labels::{disease_labels, DISEASE_CLASSES};
pub use model::{
    renormalize, BackendDescription, ClassifierBackend, Model, ModelInfo, DEFAULT_BATCH_SIZE,
};
pub use onnx::OnnxBackend;
pub use preprocess::{
    preprocess_dynamic, preprocess_image, validate_image, ImageTensor, DEFAULT_IMAGE_SIZE,
    MIN_IMAGE_SIDE,
};
