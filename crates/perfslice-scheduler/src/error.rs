//! Error types for the scheduler crate.

use thiserror::Error;

/// Failure reported by a [`SliceTask`](crate::task::SliceTask) run.
///
/// The scheduler never propagates these; it logs them with the task identity
/// and the slice arguments and moves on to the next task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task reported a failure with a message.
    #[error("{0}")]
    Failed(String),

    /// The task failed with an underlying error.
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// The task panicked; the payload message is kept when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Create a failure with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Build a [`TaskError::Panicked`] from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// Errors raised while building or driving a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A poll interval of zero was requested.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    /// The operating system refused to spawn the worker thread.
    #[error("failed to spawn worker thread '{name}': {source}")]
    SpawnFailed {
        /// Name of the thread that could not be spawned.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The worker thread panicked and could not be joined cleanly.
    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),
}

/// Result alias for task runs.
pub type TaskResult = Result<(), TaskError>;

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
