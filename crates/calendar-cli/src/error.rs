//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

use calendar_core::TracingError;
use calendar_server::ServerError;
use calendar_storage::StorageError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the `calendar` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`CalendarConfig`](crate::config::CalendarConfig).
    #[error("failed to parse config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    SerializeConfig(#[from] toml::ser::Error),

    /// A value in the configuration is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Server(#[from] ServerError),

    /// The service stopped, but a subsystem or teardown step failed.
    #[error("service stopped with {failures} failure(s)")]
    Unclean { failures: usize },
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
