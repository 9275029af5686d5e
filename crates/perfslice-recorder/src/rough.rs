//! Bounded-memory recorder.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::buckets::DenseBuckets;
use crate::recorder::Recorder;
use crate::window::WindowStamp;

/// Recorder with a fixed memory footprint.
///
/// Costs in `0..=most_time_threshold_ms` go to dense buckets. The first
/// `out_threshold_count` costs above the threshold are kept individually;
/// later ones are only counted, and reported together at the largest cost seen
/// among them. `total_count` stays exact, tail percentiles become approximate.
///
/// Every operation is lock-free.
#[derive(Debug)]
pub struct RoughRecorder {
    api: String,
    dense: DenseBuckets,
    // Each slot holds `cost + 1`; zero marks an empty slot.
    outliers: Box<[AtomicU64]>,
    outlier_cursor: AtomicUsize,
    overflow_count: AtomicU64,
    overflow_max_ms: AtomicU64,
    total: AtomicU64,
    window: WindowStamp,
}

impl RoughRecorder {
    /// Recorder for `api` tracking at most `out_threshold_count` outliers.
    #[must_use]
    pub fn new(api: impl Into<String>, most_time_threshold_ms: u32, out_threshold_count: u32) -> Self {
        let cap = usize::try_from(out_threshold_count).unwrap_or(usize::MAX);
        Self {
            api: api.into(),
            dense: DenseBuckets::new(most_time_threshold_ms),
            outliers: (0..cap).map(|_| AtomicU64::new(0)).collect(),
            outlier_cursor: AtomicUsize::new(0),
            overflow_count: AtomicU64::new(0),
            overflow_max_ms: AtomicU64::new(0),
            total: AtomicU64::new(0),
            window: WindowStamp::new(),
        }
    }

    /// Outliers that did not fit into the fixed slots this slice.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Capacity of the outlier slots.
    #[must_use]
    pub fn outlier_capacity(&self) -> usize {
        self.outliers.len()
    }

    fn record_outlier(&self, cost_ms: u64) {
        let index = self.outlier_cursor.fetch_add(1, Ordering::Relaxed);
        match self.outliers.get(index) {
            Some(slot) => slot.store(cost_ms.saturating_add(1), Ordering::Relaxed),
            None => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                self.overflow_max_ms.fetch_max(cost_ms, Ordering::Relaxed);
            }
        }
    }
}

impl Recorder for RoughRecorder {
    fn api(&self) -> &str {
        &self.api
    }

    #[inline]
    fn record(&self, cost_ms: u64) {
        if !self.dense.try_record(cost_ms) {
            self.record_outlier(cost_ms);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.dense.reset();
        for slot in self.outliers.iter() {
            slot.store(0, Ordering::Relaxed);
        }
        self.outlier_cursor.store(0, Ordering::Relaxed);
        self.overflow_count.store(0, Ordering::Relaxed);
        self.overflow_max_ms.store(0, Ordering::Relaxed);
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

        let used = self.outlier_cursor.load(Ordering::Relaxed);
        let mut tail: Vec<u64> = self
            .outliers
            .iter()
            .take(used)
            .map(|slot| slot.load(Ordering::Relaxed))
            .filter(|stored| *stored > 0)
            .map(|stored| stored.saturating_sub(1))
            .collect();

        tail.sort_unstable();

        let mut runs: Vec<(u64, u64)> = Vec::with_capacity(tail.len().saturating_add(1));
        for cost in tail {
            match runs.last_mut() {
                Some((last_cost, count)) if *last_cost == cost => *count = count.saturating_add(1),
                _ => runs.push((cost, 1)),
            }
        }

        let overflow = self.overflow_count();
        if overflow > 0 {
            let overflow_max = self.overflow_max_ms.load(Ordering::Relaxed);
            match runs.binary_search_by_key(&overflow_max, |(cost, _)| *cost) {
                Ok(index) => {
                    if let Some((_, count)) = runs.get_mut(index) {
                        *count = count.saturating_add(overflow);
                    }
                }
                Err(index) => runs.insert(index, (overflow_max, overflow)),
            }
        }

        out.extend(runs);
        out
    }
}
