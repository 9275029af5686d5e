//! Error types for statistics computation.

use thiserror::Error;

use crate::window::SliceWindow;

/// Errors raised while summarizing a recorder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// The recorder window is empty or inverted.
    #[error("recorder '{api}' has no usable window [{start_ms}, {stop_ms})")]
    InvalidWindow {
        /// API identifier.
        api: String,
        /// Window start.
        start_ms: i64,
        /// Window stop.
        stop_ms: i64,
    },

    /// Counts overflowed while summing the histogram.
    #[error("recorder '{0}' count overflowed")]
    Overflow(String),

    /// A custom calculator failed.
    #[error("statistics for '{api}' failed: {reason}")]
    Failed {
        /// API identifier.
        api: String,
        /// Why the calculation failed.
        reason: String,
    },
}

impl StatsError {
    /// Create an invalid window error.
    #[must_use]
    pub fn invalid_window(api: impl Into<String>, window: SliceWindow) -> Self {
        Self::InvalidWindow {
            api: api.into(),
            start_ms: window.start_ms,
            stop_ms: window.stop_ms,
        }
    }

    /// Create an overflow error.
    #[must_use]
    pub fn overflow(api: impl Into<String>) -> Self {
        Self::Overflow(api.into())
    }

    /// Create a generic calculation failure.
    #[must_use]
    pub fn failed(api: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            api: api.into(),
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for statistics computation.
pub type StatsResult<T> = std::result::Result<T, StatsError>;
