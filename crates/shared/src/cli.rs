//! Shared CLI functionality
//!
//! Option groups that are flattened into the backend's command line and the
//! small parsing helpers used for comma-separated environment values.

use crate::error::{DermalensError, Result};
use clap::Args;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging options shared across binaries
#[derive(Args, Debug, Clone)]
pub struct LoggingOptions {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "DERMALENS_LOG_LEVEL")]
    pub log_level: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl LoggingOptions {
    /// Initialize logging with the configured level
    ///
    /// When `debug` is set the level is raised to at least `DEBUG`.
    pub fn init_logging(&self, debug: bool) -> Result<()> {
        let level = self.effective_level(debug);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber).map_err(|e| {
            DermalensError::configuration("Failed to set logging subscriber", Some(Box::new(e)))
        })
    }

    /// Parse the log level string into a tracing Level
    pub fn parse_log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        }
    }

    /// Level actually installed, taking the debug flag into account
    pub fn effective_level(&self, debug: bool) -> Level {
        let level = self.parse_log_level();
        // tracing orders levels by verbosity: TRACE is the greatest
        if debug && level < Level::DEBUG {
            Level::DEBUG
        } else {
            level
        }
    }
}

/// Utility function to parse comma-separated strings
pub fn parse_string_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses a boolean flag the way operators write them in environment files
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
pub fn parse_bool_flag(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
