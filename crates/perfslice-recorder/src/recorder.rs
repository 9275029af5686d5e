//! The recorder capability and its registration descriptor.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::accurate::AccurateRecorder;
use crate::rough::RoughRecorder;
use crate::window::SliceWindow;

/// Default upper bound of the dense bucket range, in milliseconds.
pub const DEFAULT_MOST_TIME_THRESHOLD_MS: u32 = 1_000;

/// Default number of individually tracked outliers for [`RoughRecorder`].
pub const DEFAULT_OUT_THRESHOLD_COUNT: u32 = 64;

/// Thread-safe per-API accumulator of call latencies for one slice.
///
/// `record` is called concurrently from application threads and must not
/// block for long. Window accessors and `reset` are only used by the rotation
/// thread while the recorder is not being written.
pub trait Recorder: Send + Sync + fmt::Debug {
    /// API identifier this recorder accumulates for.
    fn api(&self) -> &str;

    /// Count one call that took `cost_ms`.
    fn record(&self, cost_ms: u64);

    /// Count one call that started at `start`.
    fn record_elapsed(&self, start: Instant) {
        let cost_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.record(cost_ms);
    }

    /// Discard everything recorded so far.
    fn reset(&self);

    /// Inclusive window start in milliseconds.
    fn window_start(&self) -> i64;

    /// Set the inclusive window start.
    fn set_window_start(&self, start_ms: i64);

    /// Exclusive window stop in milliseconds.
    fn window_stop(&self) -> i64;

    /// Set the exclusive window stop.
    fn set_window_stop(&self, stop_ms: i64);

    /// Current window bounds.
    fn window(&self) -> SliceWindow {
        SliceWindow::new(self.window_start(), self.window_stop())
    }

    /// Overwrite both window bounds.
    fn stamp(&self, window: SliceWindow) {
        self.set_window_start(window.start_ms);
        self.set_window_stop(window.stop_ms);
    }

    /// Whether the window was never stamped.
    fn is_unstamped(&self) -> bool {
        self.window_start() <= 0 || self.window_stop() <= 0
    }

    /// Number of calls recorded.
    fn total_count(&self) -> u64;

    /// Recorded costs as ascending, non-empty `(cost_ms, count)` pairs.
    fn histogram(&self) -> Vec<(u64, u64)>;
}

/// Which recorder implementation backs every registered API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderMode {
    /// Exact: every outlier above the dense range is kept.
    Accurate,
    /// Bounded memory: a capped number of outliers is kept individually.
    #[default]
    Rough,
}

impl fmt::Display for RecorderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accurate => write!(f, "accurate"),
            Self::Rough => write!(f, "rough"),
        }
    }
}

/// Static registration entry for one instrumented API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfiledApi {
    /// API identifier, e.g. `OrderService.place`.
    pub name: String,
    /// Costs up to and including this many milliseconds use dense buckets.
    #[serde(default = "default_most_time_threshold_ms")]
    pub most_time_threshold_ms: u32,
    /// Outliers tracked individually in rough mode.
    #[serde(default = "default_out_threshold_count")]
    pub out_threshold_count: u32,
}

fn default_most_time_threshold_ms() -> u32 {
    DEFAULT_MOST_TIME_THRESHOLD_MS
}

fn default_out_threshold_count() -> u32 {
    DEFAULT_OUT_THRESHOLD_COUNT
}

impl ProfiledApi {
    /// Entry with default thresholds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            most_time_threshold_ms: DEFAULT_MOST_TIME_THRESHOLD_MS,
            out_threshold_count: DEFAULT_OUT_THRESHOLD_COUNT,
        }
    }

    /// Override the dense bucket range.
    #[must_use]
    pub fn with_most_time_threshold_ms(mut self, threshold_ms: u32) -> Self {
        self.most_time_threshold_ms = threshold_ms;
        self
    }

    /// Override the outlier cap.
    #[must_use]
    pub fn with_out_threshold_count(mut self, count: u32) -> Self {
        self.out_threshold_count = count;
        self
    }

    /// Build a fresh recorder of the requested kind for this API.
    #[must_use]
    pub fn build_recorder(&self, mode: RecorderMode) -> Arc<dyn Recorder> {
        match mode {
            RecorderMode::Accurate => Arc::new(AccurateRecorder::new(
                self.name.clone(),
                self.most_time_threshold_ms,
            )),
            RecorderMode::Rough => Arc::new(RoughRecorder::new(
                self.name.clone(),
                self.most_time_threshold_ms,
                self.out_threshold_count,
            )),
        }
    }
}
