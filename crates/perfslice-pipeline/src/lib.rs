//! # perfslice-pipeline
//!
//! Double-buffered recorder rotation and background statistics delivery for
//! `perfslice`.
//!
//! Application threads record into the active [`Generation`] of a
//! [`RecorderRegistry`]. Once per slice the [`RotationCoordinator`] swaps the
//! two generations and raises the [`HandoffSignal`]; the [`AggregationPump`]
//! then summarizes the vacated generation and hands one batch to a
//! [`StatsSink`].
//!
//! ## Safety Guarantees
//!
//! - **Wait-free lookup**: [`RecorderRegistry::get_recorder`] is one atomic load
//!   and a hash lookup into an immutable map
//! - **No lock between rotation and aggregation**: a single flag carries the
//!   handoff, released by rotation and acquired by the pump
//! - **Nothing is fatal**: failing or panicking calculators and sinks are
//!   logged, the signal is always lowered, and the slice is dropped
//!
//! ## Architecture
//!
//! - [`registry`] - The two recorder generations and the active index
//! - [`handoff`] - Rotation to aggregation handshake
//! - [`rotation`] - Generation swap task fired at slice boundaries
//! - [`pump`] - Aggregation pass over the pending generation
//! - [`sink`] - [`StatsSink`] and the bundled sinks
//! - [`agent`] - [`PerfAgent`], the context object owning everything above
//! - [`config`] - [`AgentConfig`] and its loaders
//! - [`metrics`] - Pipeline counters
//! - [`error`] - Pipeline error types
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use perfslice_pipeline::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(MemorySink::new());
//! let agent = PerfAgent::builder(AgentConfig::default())
//!     .api_named("OrderService.place")
//!     .sink(sink.clone())
//!     .build()?;
//!
//! agent.record("OrderService.place", 12)?;
//!
//! // Workers normally do this once per slice.
//! agent.rotate_now();
//! agent.pump_now();
//!
//! assert_eq!(sink.batches()[0].total_count(), 1);
//! # Ok(())
//! # }
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

pub mod agent;
pub mod config;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod pump;
pub mod registry;
pub mod rotation;
pub mod sink;

pub mod prelude;

pub use agent::{PerfAgent, PerfAgentBuilder};
pub use config::{
    AgentConfig, AgentConfigBuilder, DEFAULT_AGGREGATION_POLL_MS, DEFAULT_SINK_QUEUE_CAPACITY,
};
pub use error::{
    ConfigError, ConfigResult, PipelineError, PipelineResult, SinkError, SinkResult,
};
pub use handoff::{HandoffGuard, HandoffSignal, HandoffState};
pub use metrics::{PipelineMetrics, PipelineSnapshot};
pub use pump::{AggregationPump, PumpOutcome};
pub use registry::{Generation, RecorderRegistry};
pub use rotation::{ROTATION_TASK_NAME, RotationCoordinator, RotationReport};
pub use sink::{AsyncSink, ChannelSink, LogSink, MemorySink, PerfStatBatch, StatsSink};
