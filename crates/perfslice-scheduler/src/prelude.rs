//! Prelude module for common scheduler types.
//!
//! This module provides a convenient way to import the most commonly used
//! types from the scheduler crate.

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{SchedulerError, SchedulerResult, TaskError, TaskResult};
pub use crate::gate::{ClockAlignedGate, next_boundary};
pub use crate::poller::{PollHandle, PollLoop};
pub use crate::scheduler::{TickOutcome, TimeSlicedScheduler};
pub use crate::task::{FnTask, SliceTask};
pub use crate::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SLICE_MS, MAX_SLICE_MS, MIN_SLICE_MS};
