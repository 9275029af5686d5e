//! Fixed-rate poll thread.
//!
//! Runs a closure on a dedicated named thread every `interval`. When a tick
//! overruns, the deadlines it swallowed are dropped (oldest first) and the loop
//! runs once immediately for the newest one; callers that derive their work
//! from the wall clock, like [`TimeSlicedScheduler`](crate::TimeSlicedScheduler),
//! heal on that next run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{SchedulerError, SchedulerResult, TaskError};
use crate::stats::SchedulerStats;

/// Configuration for a poll thread.
#[derive(Debug)]
pub struct PollLoop {
    name: String,
    interval: Duration,
    stats: Option<Arc<SchedulerStats>>,
}

impl PollLoop {
    /// Poll thread called `name`, ticking every `interval`.
    #[must_use]
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            stats: None,
        }
    }

    /// Report skipped deadlines into `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<SchedulerStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Spawn the thread. `tick` runs once per interval until the handle stops it.
    ///
    /// A panic inside `tick` is caught and logged; the loop keeps going.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ZeroPollInterval`] for a zero interval and
    /// [`SchedulerError::SpawnFailed`] if the OS refuses the thread.
    pub fn spawn<F>(self, mut tick: F) -> SchedulerResult<PollHandle>
    where
        F: FnMut() + Send + 'static,
    {
        if self.interval.is_zero() {
            return Err(SchedulerError::ZeroPollInterval);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let interval = self.interval;
        let stats = self.stats;
        let name = self.name.clone();
        let thread_name = self.name.clone();

        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, interval_ms = interval.as_millis(), "Poll loop started");
                let mut deadline = Instant::now();

                while !thread_stop.load(Ordering::Acquire) {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(&mut tick)) {
                        let err = TaskError::from_panic(payload.as_ref());
                        error!(thread = %thread_name, error = %err, "Poll tick panicked");
                    }

                    deadline = next_deadline(deadline, interval, Instant::now(), stats.as_deref());
                    park_until(deadline, &thread_stop);
                }

                debug!(thread = %thread_name, "Poll loop stopped");
            })
            .map_err(|source| SchedulerError::SpawnFailed {
                name: name.clone(),
                source,
            })?;

        Ok(PollHandle {
            name,
            stop,
            thread: Some(thread),
        })
    }
}

/// Advance a fixed-rate deadline, discarding deadlines already in the past.
fn next_deadline(
    previous: Instant,
    interval: Duration,
    now: Instant,
    stats: Option<&SchedulerStats>,
) -> Instant {
    let Some(next) = previous.checked_add(interval) else {
        return now;
    };
    if now <= next {
        return next;
    }

    let behind = now.saturating_duration_since(next);
    let missed = behind
        .as_nanos()
        .checked_div(interval.as_nanos())
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(u64::MAX);
    if missed > 0 {
        if let Some(stats) = stats {
            stats.add_missed_polls(missed);
        }
    }
    now
}

fn park_until(deadline: Instant, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::park_timeout(remaining);
    }
}

/// Owner of a running poll thread.
///
/// Dropping the handle stops the thread and waits for the in-flight tick.
#[derive(Debug)]
pub struct PollHandle {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and join the thread, letting an in-flight tick finish.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::WorkerPanicked`] if the thread died abnormally.
    pub fn stop(mut self) -> SchedulerResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SchedulerResult<()> {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread.thread().unpark();
        thread
            .join()
            .map_err(|_payload| SchedulerError::WorkerPanicked(self.name.clone()))
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(thread = %self.name, error = %err, "Poll loop did not stop cleanly");
        }
    }
}
