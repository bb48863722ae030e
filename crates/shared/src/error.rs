//! # Shared Error Handling Module
//!
//! Error taxonomy for the Dermalens request pipeline. Every failure that can
//! happen between receiving an upload and emitting a prediction is one
//! variant of [`DermalensError`], and every variant maps to exactly one HTTP
//! status code so the request boundary can turn it into a JSON body.
//!
//! ## Error Categories
//!
//! - **Upload Errors**: missing file field, empty filename, oversized body
//! - **Image Errors**: undecodable bytes, images below the minimum size
//! - **Model Errors**: model missing at startup, load failures, inference failures
//! - **System Errors**: configuration mistakes and unexpected internal failures

use std::net::AddrParseError;
use thiserror::Error;
use tracing::warn;

/// Result type alias for Dermalens operations
pub type Result<T> = std::result::Result<T, DermalensError>;

/// Boxed source error carried by the variants that wrap a lower-level failure
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error types for the classification pipeline
///
/// Display strings are what clients see in the `error` field of a JSON error
/// body, so they are short and never contain backtraces.
#[derive(Error, Debug)]
pub enum DermalensError {
    /// The multipart body has no `image` or `file` field carrying a file
    ///
    /// **HTTP Status Mapping**: 400 Bad Request
    #[error("No image file provided")]
    NoFileProvided,

    /// A file field was sent but its filename is empty
    ///
    /// **HTTP Status Mapping**: 400 Bad Request
    #[error("No file selected")]
    NoFileSelected,

    /// No model was loaded at startup; the service runs in degraded mode
    ///
    /// **HTTP Status Mapping**: 500 Internal Server Error
    #[error("Model not loaded")]
    ModelNotLoaded {
        /// Path the model was expected at
        expected_path: String,
    },

    /// The uploaded bytes are not a supported image
    ///
    /// **HTTP Status Mapping**: 500 Internal Server Error
    #[error("Error preprocessing image: {message}")]
    Decode {
        /// Decoder message
        message: String,
        /// Underlying decoder error
        #[source]
        source: Option<BoxedSource>,
    },

    /// The image is smaller than the minimum accepted size
    ///
    /// Only produced by explicit validation, never by the main pipeline.
    ///
    /// **HTTP Status Mapping**: 400 Bad Request
    #[error("Image too small: {width}x{height}, minimum is {min_side}x{min_side}")]
    TooSmall {
        /// Image width in pixels
        width: u32,
        /// Image height in pixels
        height: u32,
        /// Minimum accepted side length
        min_side: u32,
    },

    /// The model failed while running a forward pass
    ///
    /// **HTTP Status Mapping**: 500 Internal Server Error
    #[error("Prediction failed: {message}")]
    Inference {
        /// Runtime message
        message: String,
        /// Underlying runtime error
        #[source]
        source: Option<BoxedSource>,
    },

    /// The model file is missing, corrupt or incompatible with the runtime
    ///
    /// **HTTP Status Mapping**: 500 Internal Server Error (startup only)
    #[error("Failed to load model from {path}: {message}")]
    ModelLoad {
        /// Path that was loaded
        path: String,
        /// Loader message
        message: String,
        /// Underlying loader error
        #[source]
        source: Option<BoxedSource>,
    },

    /// The request body exceeds the upload limit
    ///
    /// **HTTP Status Mapping**: 413 Payload Too Large
    #[error("File too large. Maximum size is {}MB.", .limit_bytes / (1024 * 1024))]
    TooLargeUpload {
        /// Configured limit in bytes
        limit_bytes: usize,
    },

    /// Configuration validation errors
    ///
    /// **HTTP Status Mapping**: Not applicable (startup error)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// Optional source error for additional context
        #[source]
        source: Option<BoxedSource>,
    },

    /// Internal system errors
    ///
    /// **HTTP Status Mapping**: 500 Internal Server Error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal failure
        message: String,
        /// Source error for debugging
        #[source]
        source: Option<BoxedSource>,
    },
}

impl DermalensError {
    /// Creates a model-not-loaded error for the given expected path
    pub fn model_not_loaded(expected_path: impl Into<String>) -> Self {
        Self::ModelNotLoaded {
            expected_path: expected_path.into(),
        }
    }

    /// Creates an image decode error
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dermalens_shared::error::DermalensError;
    ///
    /// let error = DermalensError::decode("unsupported format", None);
    /// assert_eq!(error.to_http_status(), 500);
    /// ```
    pub fn decode(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Decode {
            message: message.into(),
            source,
        }
    }

    /// Creates an inference error
    pub fn inference(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Inference {
            message: message.into(),
            source,
        }
    }

    /// Creates a model load error for the given path
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dermalens_shared::error::DermalensError;
    ///
    /// let error = DermalensError::model_load("models/missing.onnx", "file not found", None);
    /// assert!(error.to_string().contains("models/missing.onnx"));
    /// ```
    pub fn model_load(
        path: impl Into<String>,
        message: impl Into<String>,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates an upload size error for the given limit
    pub fn too_large_upload(limit_bytes: usize) -> Self {
        Self::TooLargeUpload { limit_bytes }
    }

    /// Creates a configuration error with context
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dermalens_shared::error::DermalensError;
    ///
    /// let error = DermalensError::configuration("Invalid listen address", None);
    /// ```
    pub fn configuration(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Configuration {
            message: message.into(),
            source,
        }
    }

    /// Creates an internal error with source context
    pub fn internal(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Internal {
            message: message.into(),
            source,
        }
    }

    /// Maps this error to the HTTP status code returned to clients
    ///
    /// # Status Code Mapping
    ///
    /// - Missing file, empty filename, image too small: 400 Bad Request
    /// - Oversized upload: 413 Payload Too Large
    /// - Model not loaded, decode, inference, model load: 500 Internal Server Error
    /// - Configuration errors: 500 (should never reach the HTTP layer)
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::NoFileProvided | Self::NoFileSelected | Self::TooSmall { .. } => 400,
            Self::TooLargeUpload { .. } => 413,
            Self::ModelNotLoaded { .. }
            | Self::Decode { .. }
            | Self::Inference { .. }
            | Self::ModelLoad { .. }
            | Self::Internal { .. } => 500,
            Self::Configuration { .. } => {
                warn!("Configuration error reached HTTP status mapping");
                500
            }
        }
    }

    /// Stable machine-readable name of the variant, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoFileProvided => "no_file_provided",
            Self::NoFileSelected => "no_file_selected",
            Self::ModelNotLoaded { .. } => "model_not_loaded",
            Self::Decode { .. } => "decode_error",
            Self::TooSmall { .. } => "too_small",
            Self::Inference { .. } => "inference_error",
            Self::ModelLoad { .. } => "model_load_error",
            Self::TooLargeUpload { .. } => "too_large_upload",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Conversion from address parsing errors
impl From<AddrParseError> for DermalensError {
    fn from(err: AddrParseError) -> Self {
        DermalensError::configuration(
            format!("Invalid network address: {}", err),
            Some(Box::new(err)),
        )
    }
}

/// Conversion from I/O errors
///
/// A missing file maps to a configuration error because the only files this
/// service opens are named by its configuration.
impl From<std::io::Error> for DermalensError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                DermalensError::configuration("File not found", Some(Box::new(err)))
            }
            _ => DermalensError::internal("I/O error", Some(Box::new(err))),
        }
    }
}

/// Conversion from image decoding errors
///
/// Every decoder failure surfaces as a [`DermalensError::Decode`]; the
/// decoder's own message becomes the client-visible text.
impl From<image::ImageError> for DermalensError {
    fn from(err: image::ImageError) -> Self {
        DermalensError::decode(err.to_string(), Some(Box::new(err)))
    }
}
