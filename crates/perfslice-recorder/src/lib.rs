//! # perfslice-recorder
//!
//! Per-API latency recorders and per-slice statistics for `perfslice`.
//!
//! Application threads call [`Recorder::record`] on the hot path; once a slice
//! ends the recorder is summarized into a [`PerfStat`] by a [`StatsCalculator`].
//!
//! ## Safety Guarantees
//!
//! - **No allocations** when recording into the dense bucket range
//! - **Lock-free** recording for [`RoughRecorder`]; [`AccurateRecorder`] only
//!   takes a short lock for costs above its dense range
//! - **Fixed memory** for [`RoughRecorder`], exact counts for both variants
//!
//! ## Architecture
//!
//! - [`recorder`] - The [`Recorder`] capability, [`ProfiledApi`] registration and [`RecorderMode`]
//! - [`accurate`] - Exact recorder with unbounded outlier tracking
//! - [`rough`] - Bounded recorder with capped outlier tracking
//! - [`stats`] - [`PerfStat`] and the default [`PercentileCalculator`]
//! - [`window`] - Slice window stamps
//!
//! ## Usage
//!
//! ```rust
//! use perfslice_recorder::{PercentileCalculator, ProfiledApi, RecorderMode, SliceWindow, StatsCalculator};
//!
//! let recorder = ProfiledApi::new("OrderService.place").build_recorder(RecorderMode::Rough);
//!
//! // Hot path
//! recorder.record(12);
//! recorder.record(15);
//!
//! // After the slice ends
//! recorder.stamp(SliceWindow::new(1_700_000_000_000, 1_700_000_060_000));
//! let stat = PercentileCalculator.calculate(recorder.as_ref()).expect("stamped window");
//! assert_eq!(stat.total_count, 2);
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod accurate;
mod buckets;
pub mod error;
pub mod recorder;
pub mod rough;
pub mod stats;
pub mod window;

pub mod prelude;

pub use accurate::AccurateRecorder;
pub use error::{StatsError, StatsResult};
pub use recorder::{
    DEFAULT_MOST_TIME_THRESHOLD_MS, DEFAULT_OUT_THRESHOLD_COUNT, ProfiledApi, Recorder,
    RecorderMode,
};
pub use rough::RoughRecorder;
pub use stats::{PercentileCalculator, PerfStat, StatsCalculator};
pub use window::{SliceWindow, WindowStamp};
