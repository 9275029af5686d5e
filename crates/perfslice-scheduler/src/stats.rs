//! Scheduler counters.
//!
//! Relaxed atomics: these are monitoring counters, read through
//! [`SchedulerStats::snapshot`] and never used for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerSnapshot {
    /// Poll ticks observed.
    pub polls: u64,
    /// Ticks that fired the task list.
    pub fires: u64,
    /// Individual task invocations.
    pub task_runs: u64,
    /// Task invocations that returned an error or panicked.
    pub task_failures: u64,
    /// Poll deadlines skipped because a previous tick overran.
    pub missed_polls: u64,
}

/// Atomic counters owned by a scheduler and its poll loop.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    polls: AtomicU64,
    fires: AtomicU64,
    task_runs: AtomicU64,
    task_failures: AtomicU64,
    missed_polls: AtomicU64,
}

impl SchedulerStats {
    /// All counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            fires: AtomicU64::new(0),
            task_runs: AtomicU64::new(0),
            task_failures: AtomicU64::new(0),
            missed_polls: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn inc_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_fire(&self) {
        self.fires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_task_run(&self) {
        self.task_runs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_task_failure(&self) {
        self.task_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record poll deadlines that were dropped after an overrun.
    #[inline]
    pub fn add_missed_polls(&self, missed: u64) {
        self.missed_polls.fetch_add(missed, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            task_runs: self.task_runs.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            missed_polls: self.missed_polls.load(Ordering::Relaxed),
        }
    }
}
