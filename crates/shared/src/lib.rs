//! # Dermalens Shared Library
//!
//! Shared utilities and types for the Dermalens classification service.
//! This crate provides the functionality used by both the inference pipeline
//! and the HTTP backend.
//!
//! ## Features
//!
//! - **Error Handling**: One error taxonomy with HTTP status mapping
//! - **Logging**: Shared CLI option group that installs the tracing subscriber
//! - **Metrics Collection**: Lock-free request counters and latency histogram
//! - **Test Utilities**: Unique port allocation for server tests

pub mod cli;
pub mod error;
pub mod metrics;

pub mod test_utils;

// Re-export commonly used types for convenience
pub use cli::LoggingOptions;
pub use error::{DermalensError, Result};
pub use metrics::{MetricsCollector, MetricsSnapshot};
