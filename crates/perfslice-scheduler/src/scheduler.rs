//! Time-sliced dispatcher.
//!
//! A [`TimeSlicedScheduler`] is polled far more often than its slice size and
//! fires its task list once each time the wall clock crosses a slice boundary.
//! Boundaries come from [`ClockAlignedGate`], never from a tick count, so a
//! late or skipped poll simply fires on the next one.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::clock::Clock;
use crate::error::{SchedulerResult, TaskError, TaskResult};
use crate::gate::{ClockAlignedGate, clamp_slice_ms};
use crate::poller::{PollHandle, PollLoop};
use crate::stats::SchedulerStats;
use crate::task::SliceTask;

/// What a single [`TimeSlicedScheduler::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First poll: the boundary was armed and nothing fired.
    Armed {
        /// Boundary that will trigger the first firing.
        next_boundary: i64,
    },
    /// Still inside the current slice.
    Idle {
        /// Boundary the scheduler is waiting for.
        next_boundary: i64,
    },
    /// The slice turned over and every task ran.
    Fired {
        /// `now - slice` handed to every task.
        last_slice_start: i64,
        /// Newly armed boundary.
        next_boundary: i64,
        /// Tasks that failed during this tick.
        failures: usize,
    },
}

/// Periodic dispatcher firing an ordered task list once per slice.
///
/// # Ordering
///
/// Tasks run sequentially in registration order on the polling thread. One
/// task's failure (error or panic) is logged and never prevents the others,
/// or later ticks, from running.
pub struct TimeSlicedScheduler {
    name: String,
    gate: ClockAlignedGate,
    tasks: Vec<Arc<dyn SliceTask>>,
    last_boundary: Option<i64>,
    stats: Arc<SchedulerStats>,
}

impl TimeSlicedScheduler {
    /// Start building a scheduler named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TimeSlicedSchedulerBuilder {
        TimeSlicedSchedulerBuilder {
            name: name.into(),
            slice_ms: crate::DEFAULT_SLICE_MS,
            tasks: Vec::new(),
            stats: None,
        }
    }

    /// Process one poll tick at wall-clock time `now_ms`.
    pub fn poll(&mut self, now_ms: i64) -> TickOutcome {
        self.stats.inc_poll();

        let Some(boundary) = self.last_boundary else {
            let next_boundary = self.gate.next_boundary(now_ms);
            self.last_boundary = Some(next_boundary);
            debug!(
                scheduler = %self.name,
                next_boundary,
                slice_ms = self.gate.slice_ms(),
                "Scheduler armed"
            );
            return TickOutcome::Armed { next_boundary };
        };

        if now_ms < boundary {
            return TickOutcome::Idle {
                next_boundary: boundary,
            };
        }

        let next_boundary = self.gate.next_boundary(now_ms);
        self.last_boundary = Some(next_boundary);

        let last_slice_start = now_ms.saturating_sub(self.gate.slice_ms());
        let failures = self.run_all(last_slice_start);
        self.stats.inc_fire();

        TickOutcome::Fired {
            last_slice_start,
            next_boundary,
            failures,
        }
    }

    fn run_all(&self, last_slice_start: i64) -> usize {
        let mut failures = 0_usize;
        for task in &self.tasks {
            if self.run_task(task.as_ref(), last_slice_start).is_err() {
                failures = failures.saturating_add(1);
            }
        }
        failures
    }

    fn run_task(&self, task: &dyn SliceTask, last_slice_start: i64) -> TaskResult {
        let slice_ms = self.gate.slice_ms();
        let started = Instant::now();
        self.stats.inc_task_run();

        let result = catch_unwind(AssertUnwindSafe(|| task.run(last_slice_start, slice_ms)))
            .unwrap_or_else(|payload| Err(TaskError::from_panic(payload.as_ref())));

        if let Err(ref err) = result {
            self.stats.inc_task_failure();
            error!(
                scheduler = %self.name,
                task = task.name(),
                last_slice_start,
                slice_ms,
                error = %err,
                "Time-sliced task failed"
            );
        }

        debug!(
            scheduler = %self.name,
            task = task.name(),
            last_slice_start,
            cost_ms = started.elapsed().as_millis(),
            "Time-sliced task finished"
        );
        result
    }

    /// Hand the scheduler to a dedicated poll thread.
    ///
    /// The thread reads `clock` every `poll_interval` and calls [`poll`](Self::poll).
    ///
    /// # Errors
    ///
    /// Returns an error if `poll_interval` is zero or the thread cannot be spawned.
    pub fn spawn(
        mut self,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> SchedulerResult<PollHandle> {
        let thread_name = format!("perfslice-{}", self.name);
        let stats = Arc::clone(&self.stats);
        PollLoop::new(thread_name, poll_interval)
            .with_stats(stats)
            .spawn(move || {
                let now_ms = clock.now_millis();
                self.poll(now_ms);
            })
    }

    /// Scheduler name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective (clamped) slice size in milliseconds.
    #[inline]
    #[must_use]
    pub fn slice_ms(&self) -> i64 {
        self.gate.slice_ms()
    }

    /// Boundary currently armed, if any poll has happened yet.
    #[inline]
    #[must_use]
    pub fn last_boundary(&self) -> Option<i64> {
        self.last_boundary
    }

    /// Names of the registered tasks in firing order.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for TimeSlicedScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSlicedScheduler")
            .field("name", &self.name)
            .field("slice_ms", &self.gate.slice_ms())
            .field("tasks", &self.task_names())
            .field("last_boundary", &self.last_boundary)
            .finish()
    }
}

/// Builder for [`TimeSlicedScheduler`].
pub struct TimeSlicedSchedulerBuilder {
    name: String,
    slice_ms: u64,
    tasks: Vec<Arc<dyn SliceTask>>,
    stats: Option<Arc<SchedulerStats>>,
}

impl TimeSlicedSchedulerBuilder {
    /// Requested slice size; clamped into the supported range on build.
    #[must_use]
    pub fn slice_ms(mut self, slice_ms: u64) -> Self {
        self.slice_ms = slice_ms;
        self
    }

    /// Append a task. Tasks fire in the order they were added.
    #[must_use]
    pub fn task(mut self, task: Arc<dyn SliceTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Append several tasks in order.
    #[must_use]
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Arc<dyn SliceTask>>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Share an existing counter set instead of creating a fresh one.
    #[must_use]
    pub fn stats(mut self, stats: Arc<SchedulerStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Build the scheduler with the slice size clamped.
    #[must_use]
    pub fn build(self) -> TimeSlicedScheduler {
        TimeSlicedScheduler {
            name: self.name,
            gate: ClockAlignedGate::new(clamp_slice_ms(self.slice_ms)),
            tasks: self.tasks,
            last_boundary: None,
            stats: self.stats.unwrap_or_default(),
        }
    }
}
