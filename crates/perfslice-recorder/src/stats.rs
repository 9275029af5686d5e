//! Per-slice statistics.
//!
//! [`PerfStat`] is the finished summary for one API over one slice. It is
//! produced by a [`StatsCalculator`]; [`PercentileCalculator`] is the default,
//! computing nearest-rank percentiles over the recorder histogram.

use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};
use crate::recorder::Recorder;
use crate::window::SliceWindow;

/// Summary of one API over one completed slice. Latencies are in milliseconds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerfStat {
    /// API identifier.
    pub api: String,
    /// Slice the numbers cover.
    pub window: SliceWindow,
    /// Calls recorded.
    pub total_count: u64,
    /// Calls per second over the window.
    pub tps: f64,
    /// Fastest call.
    pub min_ms: u64,
    /// Slowest call.
    pub max_ms: u64,
    /// Mean latency.
    pub avg_ms: f64,
    /// Population standard deviation.
    pub stddev_ms: f64,
    /// Median.
    pub tp50: u64,
    /// 90th percentile.
    pub tp90: u64,
    /// 95th percentile.
    pub tp95: u64,
    /// 99th percentile.
    pub tp99: u64,
    /// 99.9th percentile.
    pub tp999: u64,
    /// 99.99th percentile.
    pub tp9999: u64,
    /// 100th percentile (equals `max_ms`).
    pub tp100: u64,
}

impl PerfStat {
    /// Whether any call was recorded.
    #[must_use]
    pub fn has_calls(&self) -> bool {
        self.total_count > 0
    }
}

/// Turns a recorder's accumulated state into a [`PerfStat`].
pub trait StatsCalculator: Send + Sync {
    /// Summarize `recorder` over its stamped window.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder cannot be summarized; the caller drops
    /// that recorder from the batch.
    fn calculate(&self, recorder: &dyn Recorder) -> StatsResult<PerfStat>;
}

/// Nearest-rank percentile calculator over the recorder histogram.
///
/// `total_count` and `tps` come from [`Recorder::total_count`]; the cost
/// statistics cover the calls visible in the histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentileCalculator;

const PERCENTILES: [f64; 7] = [0.50, 0.90, 0.95, 0.99, 0.999, 0.9999, 1.0];

impl StatsCalculator for PercentileCalculator {
    #[expect(
        clippy::cast_precision_loss,
        reason = "latency statistics tolerate f64 rounding of very large counts"
    )]
    fn calculate(&self, recorder: &dyn Recorder) -> StatsResult<PerfStat> {
        let window = recorder.window();
        let duration_ms = window.duration_ms();
        if duration_ms <= 0 {
            return Err(StatsError::invalid_window(recorder.api(), window));
        }

        let histogram = recorder.histogram();
        let mut stat = PerfStat {
            api: recorder.api().to_string(),
            window,
            ..PerfStat::default()
        };

        let mut total = 0_u64;
        let mut sum = 0_f64;
        for &(cost, count) in &histogram {
            total = total.checked_add(count).ok_or_else(|| StatsError::overflow(recorder.api()))?;
            sum += cost as f64 * count as f64;
        }

        // A writer still finishing an outlier can be counted before its cost
        // lands in the histogram.
        let total_count = recorder.total_count().max(total);
        if total_count == 0 {
            return Ok(stat);
        }
        stat.total_count = total_count;
        stat.tps = total_count as f64 * 1_000.0 / duration_ms as f64;
        if total == 0 {
            return Ok(stat);
        }

        let avg = sum / total as f64;
        let variance = histogram
            .iter()
            .map(|&(cost, count)| {
                let delta = cost as f64 - avg;
                delta * delta * count as f64
            })
            .sum::<f64>()
            / total as f64;

        let [tp50, tp90, tp95, tp99, tp999, tp9999, tp100] =
            PERCENTILES.map(|p| nearest_rank(&histogram, total, p));

        stat.min_ms = histogram.first().map_or(0, |&(cost, _)| cost);
        stat.max_ms = histogram.last().map_or(0, |&(cost, _)| cost);
        stat.avg_ms = avg;
        stat.stddev_ms = variance.sqrt();
        stat.tp50 = tp50;
        stat.tp90 = tp90;
        stat.tp95 = tp95;
        stat.tp99 = tp99;
        stat.tp999 = tp999;
        stat.tp9999 = tp9999;
        stat.tp100 = tp100;
        Ok(stat)
    }
}

/// Smallest cost whose cumulative count reaches `ceil(p * total)`.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "rank is clamped to [1, total] after the float round trip"
)]
fn nearest_rank(histogram: &[(u64, u64)], total: u64, p: f64) -> u64 {
    let rank = ((p * total as f64).ceil() as u64).clamp(1, total);
    let mut seen = 0_u64;
    for &(cost, count) in histogram {
        seen = seen.saturating_add(count);
        if seen >= rank {
            return cost;
        }
    }
    histogram.last().map_or(0, |&(cost, _)| cost)
}
