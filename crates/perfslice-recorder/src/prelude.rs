//! Prelude for perfslice-recorder.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use perfslice_recorder::prelude::*;
//!
//! let recorder = RoughRecorder::new("A.b", 100, 16);
//! recorder.record(3);
//! assert_eq!(recorder.total_count(), 1);
//! ```

pub use crate::accurate::AccurateRecorder;
pub use crate::error::{StatsError, StatsResult};
pub use crate::recorder::{ProfiledApi, Recorder, RecorderMode};
pub use crate::rough::RoughRecorder;
pub use crate::stats::{PercentileCalculator, PerfStat, StatsCalculator};
pub use crate::window::SliceWindow;
