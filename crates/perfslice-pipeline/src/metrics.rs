//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineSnapshot {
    /// Generation swaps performed.
    pub rotations: u64,
    /// Active recorders stamped at rotation because they had no window yet.
    pub boot_stamps: u64,
    /// Rotations that found the previous handoff still raised.
    pub overruns: u64,
    /// Batches the sink accepted.
    pub batches_delivered: u64,
    /// Per-recorder statistics computed successfully.
    pub stats_computed: u64,
    /// Recorders skipped because their statistics failed.
    pub stat_failures: u64,
    /// Batches the sink rejected or panicked on.
    pub delivery_failures: u64,
    /// Handoffs whose pending generation held no recorders.
    pub empty_passes: u64,
}

/// Atomic counters shared by rotation and aggregation.
///
/// Relaxed ordering throughout: the handoff signal carries the synchronization,
/// these are only read for reporting.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    rotations: AtomicU64,
    boot_stamps: AtomicU64,
    overruns: AtomicU64,
    batches_delivered: AtomicU64,
    stats_computed: AtomicU64,
    stat_failures: AtomicU64,
    delivery_failures: AtomicU64,
    empty_passes: AtomicU64,
}

impl PipelineMetrics {
    /// All counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rotations: AtomicU64::new(0),
            boot_stamps: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            stats_computed: AtomicU64::new(0),
            stat_failures: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            empty_passes: AtomicU64::new(0),
        }
    }

    pub(crate) fn inc_rotations(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_boot_stamps(&self, count: u64) {
        self.boot_stamps.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn inc_overruns(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_batches_delivered(&self) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_stats_computed(&self, count: u64) {
        self.stats_computed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_stat_failures(&self, count: u64) {
        self.stat_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn inc_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_empty_passes(&self) {
        self.empty_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            rotations: self.rotations.load(Ordering::Relaxed),
            boot_stamps: self.boot_stamps.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            stats_computed: self.stats_computed.load(Ordering::Relaxed),
            stat_failures: self.stat_failures.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            empty_passes: self.empty_passes.load(Ordering::Relaxed),
        }
    }
}
