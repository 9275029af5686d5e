//! Agent configuration.
//!
//! [`AgentConfig`] can be built in code through [`AgentConfigBuilder`] or loaded
//! from YAML or JSON. Missing fields take their defaults.

use std::path::Path;

use perfslice_recorder::{
    DEFAULT_MOST_TIME_THRESHOLD_MS, DEFAULT_OUT_THRESHOLD_COUNT, ProfiledApi, RecorderMode,
};
use perfslice_scheduler::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SLICE_MS, clamp_slice_ms};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default cadence of the aggregation worker.
pub const DEFAULT_AGGREGATION_POLL_MS: u64 = 100;

/// Default number of batches an [`AsyncSink`](crate::AsyncSink) may queue.
pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 16;

/// Runtime configuration of a [`PerfAgent`](crate::PerfAgent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// When false, `start` leaves the workers off and recording still works.
    pub enabled: bool,
    /// Slice size in milliseconds. Clamped, never rejected.
    pub slice_ms: u64,
    /// Poll interval of the rotation scheduler.
    pub rotation_poll_ms: u64,
    /// Poll interval of the aggregation worker.
    pub aggregation_poll_ms: u64,
    /// Recorder variant for every registered API.
    pub recorder_mode: RecorderMode,
    /// Dense bucket range for APIs registered by name only.
    pub default_most_time_threshold_ms: u32,
    /// Outlier cap for APIs registered by name only.
    pub default_out_threshold_count: u32,
    /// Queue depth for asynchronous sinks.
    pub sink_queue_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slice_ms: DEFAULT_SLICE_MS,
            rotation_poll_ms: DEFAULT_POLL_INTERVAL_MS,
            aggregation_poll_ms: DEFAULT_AGGREGATION_POLL_MS,
            recorder_mode: RecorderMode::default(),
            default_most_time_threshold_ms: DEFAULT_MOST_TIME_THRESHOLD_MS,
            default_out_threshold_count: DEFAULT_OUT_THRESHOLD_COUNT,
            sink_queue_capacity: DEFAULT_SINK_QUEUE_CAPACITY,
        }
    }
}

impl AgentConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a poll interval or the sink queue capacity is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rotation_poll_ms == 0 {
            return Err(ConfigError::invalid(
                "rotation_poll_ms must be greater than 0",
            ));
        }
        if self.aggregation_poll_ms == 0 {
            return Err(ConfigError::invalid(
                "aggregation_poll_ms must be greater than 0",
            ));
        }
        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "sink_queue_capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Slice size actually used, after clamping.
    #[must_use]
    pub fn effective_slice_ms(&self) -> i64 {
        clamp_slice_ms(self.slice_ms)
    }

    /// Registration entry for `name` carrying this config's default thresholds.
    #[must_use]
    pub fn profiled_api(&self, name: impl Into<String>) -> ProfiledApi {
        ProfiledApi::new(name)
            .with_most_time_threshold_ms(self.default_most_time_threshold_ms)
            .with_out_threshold_count(self.default_out_threshold_count)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails validation.
    pub fn from_yaml_str(input: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails validation.
    pub fn from_json_str(input: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has another extension, does
    /// not parse, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let contents = || {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        };

        match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&contents()?),
            Some("json") => Self::from_json_str(&contents()?),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Builder for `AgentConfig`.
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    /// Enable or disable the workers.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the slice size in milliseconds.
    #[must_use]
    pub fn slice_ms(mut self, ms: u64) -> Self {
        self.config.slice_ms = ms;
        self
    }

    /// Set the rotation poll interval in milliseconds.
    #[must_use]
    pub fn rotation_poll_ms(mut self, ms: u64) -> Self {
        self.config.rotation_poll_ms = ms;
        self
    }

    /// Set the aggregation poll interval in milliseconds.
    #[must_use]
    pub fn aggregation_poll_ms(mut self, ms: u64) -> Self {
        self.config.aggregation_poll_ms = ms;
        self
    }

    /// Set the recorder variant.
    #[must_use]
    pub fn recorder_mode(mut self, mode: RecorderMode) -> Self {
        self.config.recorder_mode = mode;
        self
    }

    /// Set the default dense bucket range.
    #[must_use]
    pub fn default_most_time_threshold_ms(mut self, ms: u32) -> Self {
        self.config.default_most_time_threshold_ms = ms;
        self
    }

    /// Set the default outlier cap.
    #[must_use]
    pub fn default_out_threshold_count(mut self, count: u32) -> Self {
        self.config.default_out_threshold_count = count;
        self
    }

    /// Set the asynchronous sink queue depth.
    #[must_use]
    pub fn sink_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.sink_queue_capacity = capacity;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> ConfigResult<AgentConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
