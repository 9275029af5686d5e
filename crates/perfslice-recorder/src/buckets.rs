//! Dense per-millisecond buckets.

use core::sync::atomic::{AtomicU64, Ordering};

/// One atomic counter per millisecond of cost in `0..=threshold_ms`.
///
/// Allocated once; recording is a single relaxed `fetch_add`.
#[derive(Debug)]
pub(crate) struct DenseBuckets {
    counts: Box<[AtomicU64]>,
}

impl DenseBuckets {
    pub(crate) fn new(threshold_ms: u32) -> Self {
        let len = usize::try_from(threshold_ms)
            .unwrap_or(usize::MAX)
            .saturating_add(1);
        let counts = (0..len).map(|_| AtomicU64::new(0)).collect();
        Self { counts }
    }

    /// Largest cost (inclusive) that lands in a bucket.
    pub(crate) fn threshold_ms(&self) -> u64 {
        u64::try_from(self.counts.len().saturating_sub(1)).unwrap_or(u64::MAX)
    }

    /// Count `cost_ms`; returns `false` if it is above the threshold.
    #[inline]
    pub(crate) fn try_record(&self, cost_ms: u64) -> bool {
        let Some(bucket) = usize::try_from(cost_ms)
            .ok()
            .and_then(|index| self.counts.get(index))
        else {
            return false;
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn reset(&self) {
        for bucket in self.counts.iter() {
            bucket.store(0, Ordering::Relaxed);
        }
    }

    /// Append non-empty `(cost_ms, count)` pairs in ascending cost order.
    pub(crate) fn fill_histogram(&self, out: &mut Vec<(u64, u64)>) {
        for (cost, bucket) in (0_u64..).zip(self.counts.iter()) {
            let count = bucket.load(Ordering::Relaxed);
            if count > 0 {
                out.push((cost, count));
            }
        }
    }
}
