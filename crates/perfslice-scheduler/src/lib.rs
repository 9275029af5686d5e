//! Wall-clock aligned, time-sliced task scheduling.
//!
//! This crate fires periodic jobs once per fixed slice of wall-clock time while
//! being polled far more often than the slice size. It includes:
//!
//! - **ClockAlignedGate**: Pure slice-boundary arithmetic shared by every scheduler
//! - **TimeSlicedScheduler**: Ordered task list fired once per elapsed slice
//! - **PollLoop**: Dedicated fixed-rate poll thread with overrun discarding
//! - **Clock**: Injectable wall clock (`SystemClock`, `ManualClock`)
//!
//! # Guarantees
//!
//! - **At most once per slice** for every task, regardless of poll frequency
//! - **Sequential firing** in registration order on the poll thread
//! - **Fault isolation**: a failing or panicking task never stops its siblings
//! - **Self-healing**: boundaries are recomputed from the wall clock each tick
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use perfslice_scheduler::{FnTask, SliceTask, SystemClock, TimeSlicedScheduler};
//!
//! let task: Arc<dyn SliceTask> = Arc::new(FnTask::new("report", |start, slice| {
//!     println!("slice [{start}, {}) finished", start + slice);
//!     Ok(())
//! }));
//!
//! let scheduler = TimeSlicedScheduler::builder("report")
//!     .slice_ms(60_000)
//!     .task(task)
//!     .build();
//! let handle = scheduler
//!     .spawn(Arc::new(SystemClock), Duration::from_millis(10))
//!     .expect("spawn poll thread");
//! // ...
//! handle.stop().expect("stop poll thread");
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod clock;
pub mod error;
pub mod gate;
pub mod poller;
pub mod scheduler;
pub mod stats;
pub mod task;

pub mod prelude;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SchedulerError, SchedulerResult, TaskError, TaskResult};
pub use gate::{ClockAlignedGate, clamp_slice_ms, next_boundary};
pub use poller::{PollHandle, PollLoop};
pub use scheduler::{TickOutcome, TimeSlicedScheduler, TimeSlicedSchedulerBuilder};
pub use stats::{SchedulerSnapshot, SchedulerStats};
pub use task::{FnTask, SliceTask};

/// Smallest accepted slice size (1s).
pub const MIN_SLICE_MS: u64 = 1_000;

/// Largest accepted slice size (10min).
pub const MAX_SLICE_MS: u64 = 600_000;

/// Slice size used when none is configured (1min).
pub const DEFAULT_SLICE_MS: u64 = 60_000;

/// Poll interval recommended for slice-driven schedulers (10ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
