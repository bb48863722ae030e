//! # Dermalens Backend
//!
//! HTTP service that classifies skin-lesion photographs.
//!
//! ## Features
//!
//! - Multipart image upload on `/predict`
//! - ONNX classifier loaded once at startup, shared read-only
//! - Health and metrics endpoints
//! - CORS allow list for browser clients
//! - Degraded mode when the model file is missing

pub mod cli_options;
pub mod config;
pub mod server;

pub use cli_options::{load_model, BackendCliOptions};
pub use config::{BackendConfig, Environment};
pub use server::{handle_request, AppState, PredictionServer, ServerHandle};
