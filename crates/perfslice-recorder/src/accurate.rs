//! Exact recorder.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::buckets::DenseBuckets;
use crate::recorder::Recorder;
use crate::window::WindowStamp;

/// Recorder that keeps every observation at full precision.
///
/// Costs in `0..=most_time_threshold_ms` go to lock-free dense buckets. Costs
/// above the threshold are kept in an ordered map behind a short mutex; memory
/// grows with the number of distinct outlier costs.
#[derive(Debug)]
pub struct AccurateRecorder {
    api: String,
    dense: DenseBuckets,
    outliers: Mutex<BTreeMap<u64, u64>>,
    total: AtomicU64,
    window: WindowStamp,
}

impl AccurateRecorder {
    /// Recorder for `api` with dense buckets up to `most_time_threshold_ms`.
    #[must_use]
    pub fn new(api: impl Into<String>, most_time_threshold_ms: u32) -> Self {
        Self {
            api: api.into(),
            dense: DenseBuckets::new(most_time_threshold_ms),
            outliers: Mutex::new(BTreeMap::new()),
            total: AtomicU64::new(0),
            window: WindowStamp::new(),
        }
    }

    /// Number of distinct outlier costs currently held.
    #[must_use]
    pub fn distinct_outliers(&self) -> usize {
        self.outliers.lock().len()
    }
}

impl Recorder for AccurateRecorder {
    fn api(&self) -> &str {
        &self.api
    }

    #[inline]
    fn record(&self, cost_ms: u64) {
        if !self.dense.try_record(cost_ms) {
            let mut outliers = self.outliers.lock();
            let count = outliers.entry(cost_ms).or_insert(0);
            *count = count.saturating_add(1);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.dense.reset();
        self.outliers.lock().clear();
        self.total.store(0, Ordering::Relaxed);
    }

    fn window_start(&self) -> i64 {
        self.window.start_ms()
    }

    fn set_window_start(&self, start_ms: i64) {
        self.window.set_start_ms(start_ms);
    }

    fn window_stop(&self) -> i64 {
        self.window.stop_ms()
    }

    fn set_window_stop(&self, stop_ms: i64) {
        self.window.set_stop_ms(stop_ms);
    }

    fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn histogram(&self) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        self.dense.fill_histogram(&mut out);
        // BTreeMap iterates in key order and every key is above the dense range.
        out.extend(self.outliers.lock().iter().map(|(cost, count)| (*cost, *count)));
        out
    }
}
