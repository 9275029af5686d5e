//! Error types for the rotation pipeline.
//!
//! This module separates configuration problems, sink delivery failures and
//! agent lifecycle errors so callers can tell a bad config file from a
//! downstream consumer that went away.

use std::path::PathBuf;

use perfslice_scheduler::SchedulerError;
use thiserror::Error;

/// Errors raised while loading or validating an [`AgentConfig`](crate::AgentConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the pipeline cannot run with.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// YAML input did not parse.
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON input did not parse.
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is neither YAML nor JSON.
    #[error("Unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

impl ConfigError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Errors a [`StatsSink`](crate::StatsSink) reports for one batch.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink refused the batch.
    #[error("Sink rejected batch: {0}")]
    Rejected(String),

    /// A bounded queue in front of the consumer is full.
    #[error("Sink queue is full")]
    QueueFull,

    /// The consumer side is gone.
    #[error("Sink consumer disconnected")]
    Disconnected,

    /// A statistic could not be serialized.
    #[error("Failed to serialize statistics: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The sink worker thread could not be started.
    #[error("Failed to spawn sink worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SinkError {
    /// Create a rejected batch error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Errors raised by the registry and the agent lifecycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The same API identifier was registered twice.
    #[error("API '{0}' is registered more than once")]
    DuplicateApi(String),

    /// An API identifier was empty.
    #[error("API identifier must not be empty")]
    EmptyApiName,

    /// No recorder exists for the identifier.
    #[error("Unknown API: {0}")]
    UnknownApi(String),

    /// `start` was called while the workers were already running.
    #[error("Agent is already running")]
    AlreadyRunning,

    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker thread failed to start or stop.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl PipelineError {
    /// Create a duplicate API error.
    #[must_use]
    pub fn duplicate_api(api: impl Into<String>) -> Self {
        Self::DuplicateApi(api.into())
    }

    /// Create an unknown API error.
    #[must_use]
    pub fn unknown_api(api: impl Into<String>) -> Self {
        Self::UnknownApi(api.into())
    }
}

/// A specialized `Result` type for configuration handling.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized `Result` type for sink delivery.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// A specialized `Result` type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::duplicate_api("A.b");
        assert_eq!(err.to_string(), "API 'A.b' is registered more than once");

        let err = PipelineError::from(ConfigError::invalid("rotation_poll_ms must be greater than 0"));
        assert!(err.to_string().contains("rotation_poll_ms"));

        let err = SinkError::rejected("closed for maintenance");
        assert!(err.to_string().contains("closed for maintenance"));
    }

    #[test]
    fn test_io_error_names_path() {
        let err = ConfigError::Io {
            path: PathBuf::from("/etc/perfslice.yaml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/etc/perfslice.yaml"));
    }
}
