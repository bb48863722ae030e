//! Backend configuration management
//!
//! [`BackendConfig`] is built once at startup, from defaults, environment
//! variables or command-line options, validated by [`BackendConfig::new`],
//! and shared read-only by every request afterwards.

use dermalens_inference::{disease_labels, DEFAULT_BATCH_SIZE, DEFAULT_IMAGE_SIZE};
use dermalens_shared::cli::{parse_bool_flag, parse_string_list};
use dermalens_shared::{DermalensError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Default upload limit: 16 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default model location, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "models/skin_disease_classification_model.onnx";

/// Deployment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; debug on unless overridden
    #[default]
    Development,
    /// Production deployment; debug off unless overridden
    Production,
}

impl Environment {
    /// Debug flag used when none is given explicitly
    pub fn default_debug(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = DermalensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "default" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(DermalensError::configuration(
                format!(
                    "unknown environment '{}', expected development or production",
                    other
                ),
                None,
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration for the backend server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Address to bind the HTTP server to
    pub listen_addr: SocketAddr,
    /// Path to the ONNX classifier
    pub model_path: PathBuf,
    /// Directory created at startup for uploads; nothing is written to it
    pub upload_folder: PathBuf,
    /// Model input resolution as `(width, height)`
    pub image_size: (u32, u32),
    /// Training batch size, reported by `/health` only
    pub batch_size: usize,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Expected upload extensions; others are logged, not rejected
    pub allowed_extensions: Vec<String>,
    /// Class names in model output order
    pub labels: Vec<String>,
    /// Origins allowed to call the API from a browser; `*` allows any
    pub cors_origins: Vec<String>,
    /// Forces debug-level logging
    pub debug: bool,
    /// Deployment profile
    pub environment: Environment,
    /// Declared request budget such as `100 per hour`; never enforced
    pub api_rate_limit: String,
    /// Logging level
    pub log_level: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let environment = Environment::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            upload_folder: PathBuf::from("uploads"),
            image_size: DEFAULT_IMAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: ["png", "jpg", "jpeg", "gif"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            labels: disease_labels(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            debug: environment.default_debug(),
            environment,
            api_rate_limit: "100 per hour".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl BackendConfig {
    /// Validates a configuration
    ///
    /// # Validation Rules
    ///
    /// - image size and upload limit must be non-zero
    /// - labels must be non-empty and unique
    /// - model path must be non-empty
    /// - extensions must be bare, e.g. `png` rather than `.png`
    /// - CORS origins must be `*` or an `http(s)://` origin
    /// - the rate limit must read `<count> per <second|minute|hour|day>`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dermalens_backend::BackendConfig;
    ///
    /// let mut config = BackendConfig::default();
    /// config.api_rate_limit = "10 per minute".to_string();
    ///
    /// let validated = BackendConfig::new(config)?;
    /// # Ok::<(), dermalens_shared::DermalensError>(())
    /// ```
    pub fn new(mut config: BackendConfig) -> Result<Self> {
        debug!("Validating backend configuration");

        if config.image_size.0 == 0 || config.image_size.1 == 0 {
            return Err(DermalensError::configuration(
                format!(
                    "image_size must be non-zero, got {}x{}",
                    config.image_size.0, config.image_size.1
                ),
                None,
            ));
        }

        if config.max_upload_bytes == 0 {
            return Err(DermalensError::configuration(
                "max_upload_bytes must be greater than zero",
                None,
            ));
        }

        if config.model_path.as_os_str().is_empty() {
            return Err(DermalensError::configuration(
                "model_path must not be empty",
                None,
            ));
        }

        if config.labels.is_empty() {
            return Err(DermalensError::configuration(
                "at least one label is required",
                None,
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = config.labels.iter().find(|l| !seen.insert(l.as_str())) {
            return Err(DermalensError::configuration(
                format!("duplicate label '{}'", duplicate),
                None,
            ));
        }

        config.allowed_extensions = config
            .allowed_extensions
            .iter()
            .map(|e| e.trim().to_lowercase())
            .collect();
        if let Some(bad) = config
            .allowed_extensions
            .iter()
            .find(|e| e.is_empty() || e.contains(['.', '/', '\\']))
        {
            return Err(DermalensError::configuration(
                format!("invalid file extension '{}'", bad),
                None,
            ));
        }

        if let Some(bad) = config.cors_origins.iter().find(|o| {
            o.as_str() != "*" && !o.starts_with("http://") && !o.starts_with("https://")
        }) {
            return Err(DermalensError::configuration(
                format!("invalid CORS origin '{}'", bad),
                None,
            ));
        }

        parse_rate_limit(&config.api_rate_limit)?;

        Ok(config)
    }

    /// Creates configuration from environment variables, falling back to defaults
    ///
    /// # Environment Variables
    ///
    /// - `DERMALENS_LISTEN_ADDR`: bind address (default `0.0.0.0:5001`)
    /// - `DERMALENS_MODEL_PATH`: ONNX model path
    /// - `DERMALENS_UPLOAD_FOLDER`: upload directory (default `uploads`)
    /// - `DERMALENS_CORS_ORIGINS`: comma-separated origins
    /// - `DERMALENS_ENV`: `development` or `production`
    /// - `DERMALENS_DEBUG`: boolean; defaults from `DERMALENS_ENV`
    /// - `DERMALENS_API_RATE_LIMIT`: e.g. `100 per hour`
    /// - `DERMALENS_LOG_LEVEL`: error, warn, info, debug or trace
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment variables");

        let mut config = Self::default();

        if let Ok(addr) = std::env::var("DERMALENS_LISTEN_ADDR") {
            config.listen_addr = addr.parse().map_err(|e| {
                DermalensError::configuration(
                    format!("Invalid DERMALENS_LISTEN_ADDR: {}", e),
                    None,
                )
            })?;
        }

        if let Ok(path) = std::env::var("DERMALENS_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }

        if let Ok(folder) = std::env::var("DERMALENS_UPLOAD_FOLDER") {
            config.upload_folder = PathBuf::from(folder);
        }

        if let Ok(origins) = std::env::var("DERMALENS_CORS_ORIGINS") {
            config.cors_origins = parse_string_list(&origins);
        }

        if let Ok(env) = std::env::var("DERMALENS_ENV") {
            config.environment = env.parse()?;
        }

        config.debug = match std::env::var("DERMALENS_DEBUG") {
            Ok(value) => parse_bool_flag(&value).ok_or_else(|| {
                DermalensError::configuration(
                    format!("Invalid DERMALENS_DEBUG: '{}'", value),
                    None,
                )
            })?,
            Err(_) => config.environment.default_debug(),
        };

        if let Ok(limit) = std::env::var("DERMALENS_API_RATE_LIMIT") {
            config.api_rate_limit = limit;
        }

        if let Ok(log_level) = std::env::var("DERMALENS_LOG_LEVEL") {
            config.log_level = log_level;
        }

        debug!(
            vars_loaded = std::env::vars()
                .filter(|(k, _)| k.starts_with("DERMALENS_"))
                .count(),
            "Environment variable configuration loaded"
        );

        Self::new(config)
    }

    /// Creates the upload folder if it does not exist yet
    pub fn prepare_upload_folder(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_folder).map_err(|e| {
            DermalensError::configuration(
                format!(
                    "Failed to create upload folder {}",
                    self.upload_folder.display()
                ),
                Some(Box::new(e)),
            )
        })?;
        debug!(upload_folder = %self.upload_folder.display(), "Upload folder ready");
        Ok(())
    }

    /// Whether `filename` ends in one of the expected extensions
    pub fn is_allowed_filename(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
    }

    /// Whether a browser request from `origin` may read responses
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.cors_origins.iter().any(|o| o == "*" || o == origin)
    }

    /// Logs the declared rate limit; requests are never throttled
    pub fn log_rate_limit(&self) {
        if let Ok((count, period)) = parse_rate_limit(&self.api_rate_limit) {
            info!(
                api_rate_limit = %self.api_rate_limit,
                requests = count,
                period_seconds = period.as_secs(),
                "API rate limit declared (not enforced)"
            );
        }
    }
}

/// Parses `<count> per <unit>` into a request count and period
///
/// # Examples
///
/// ```rust
/// use dermalens_backend::config::parse_rate_limit;
/// use std::time::Duration;
///
/// assert_eq!(parse_rate_limit("100 per hour")?, (100, Duration::from_secs(3600)));
/// # Ok::<(), dermalens_shared::DermalensError>(())
/// ```
pub fn parse_rate_limit(input: &str) -> Result<(u32, Duration)> {
    let invalid = || {
        DermalensError::configuration(
            format!(
                "Invalid rate limit '{}', expected '<count> per <second|minute|hour|day>'",
                input
            ),
            None,
        )
    };

    let mut parts = input.split_whitespace();
    let (Some(count), Some("per"), Some(unit), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let count: u32 = count.parse().map_err(|_| invalid())?;
    let period = match unit.trim_end_matches('s') {
        "second" => Duration::from_secs(1),
        "minute" => Duration::from_secs(60),
        "hour" => Duration::from_secs(3600),
        "day" => Duration::from_secs(86_400),
        _ => return Err(invalid()),
    };

    Ok((count, period))
}
