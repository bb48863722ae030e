//! CLI options for the Dermalens Backend
//!
//! Every flag can also be set through a `DERMALENS_*` environment variable.

use crate::config::{BackendConfig, Environment, DEFAULT_MODEL_PATH};
use crate::server::PredictionServer;
use clap::builder::BoolishValueParser;
use clap::Parser;
use dermalens_inference::Model;
use dermalens_shared::cli::parse_string_list;
use dermalens_shared::{LoggingOptions, MetricsCollector, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Dermalens Backend - skin-lesion classification server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct BackendCliOptions {
    /// Address to listen on
    #[arg(
        short,
        long,
        default_value = "0.0.0.0:5001",
        env = "DERMALENS_LISTEN_ADDR"
    )]
    pub listen_addr: SocketAddr,

    /// Path to the ONNX classifier
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH, env = "DERMALENS_MODEL_PATH")]
    pub model_path: PathBuf,

    /// Directory created at startup for uploads
    #[arg(long, default_value = "uploads", env = "DERMALENS_UPLOAD_FOLDER")]
    pub upload_folder: PathBuf,

    /// Allowed browser origins (comma-separated, `*` for any)
    #[arg(
        long,
        default_value = "http://localhost:3000,http://localhost:5173",
        env = "DERMALENS_CORS_ORIGINS"
    )]
    pub cors_origins: String,

    /// Deployment profile (development or production)
    #[arg(long = "env", default_value = "development", env = "DERMALENS_ENV")]
    pub environment: String,

    /// Force debug logging; defaults from the deployment profile
    #[arg(
        long,
        env = "DERMALENS_DEBUG",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub debug: Option<bool>,

    /// Declared request budget, e.g. "100 per hour" (logged, not enforced)
    #[arg(long, default_value = "100 per hour", env = "DERMALENS_API_RATE_LIMIT")]
    pub api_rate_limit: String,

    #[command(flatten)]
    pub logging: LoggingOptions,
}

impl BackendCliOptions {
    /// Run the backend server with the configured options
    ///
    /// Loads the model once; a missing or broken model is logged and the
    /// server starts anyway so `/health` stays reachable.
    pub async fn run(self) -> Result<()> {
        let config = self.to_config()?;
        self.logging.init_logging(config.debug)?;

        info!(
            listen_addr = %config.listen_addr,
            model_path = %config.model_path.display(),
            environment = %config.environment,
            debug = config.debug,
            "Starting Dermalens Backend"
        );
        config.log_rate_limit();
        config.prepare_upload_folder()?;

        let model = load_model(&config);
        let metrics = Arc::new(MetricsCollector::new());
        let server = PredictionServer::new(Arc::new(config), model, metrics);

        server.start().await
    }

    /// Convert CLI options to BackendConfig
    pub fn to_config(&self) -> Result<BackendConfig> {
        let environment: Environment = self.environment.parse()?;

        BackendConfig::new(BackendConfig {
            listen_addr: self.listen_addr,
            model_path: self.model_path.clone(),
            upload_folder: self.upload_folder.clone(),
            cors_origins: parse_string_list(&self.cors_origins),
            debug: self.debug.unwrap_or_else(|| environment.default_debug()),
            environment,
            api_rate_limit: self.api_rate_limit.clone(),
            log_level: self.logging.log_level.clone(),
            ..BackendConfig::default()
        })
    }
}

/// Loads the classifier, returning `None` when the server must run degraded
pub fn load_model(config: &BackendConfig) -> Option<Arc<Model>> {
    if !config.model_path.is_file() {
        warn!(
            model_path = %config.model_path.display(),
            "Model file not found; /predict will answer 'Model not loaded'"
        );
        return None;
    }

    match Model::load(&config.model_path, config.image_size, config.labels.len()) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            error!(error = %e, "Failed to load model");
            None
        }
    }
}
