//! Prelude for perfslice-pipeline.
//!
//! Re-exports the types an embedding application needs, including the
//! recorder and scheduler types that appear in the agent's API.

pub use crate::agent::{PerfAgent, PerfAgentBuilder};
pub use crate::config::AgentConfig;
pub use crate::error::{ConfigError, PipelineError, PipelineResult, SinkError, SinkResult};
pub use crate::pump::PumpOutcome;
pub use crate::rotation::RotationReport;
pub use crate::sink::{AsyncSink, ChannelSink, LogSink, MemorySink, PerfStatBatch, StatsSink};
pub use perfslice_recorder::{
    PerfStat, ProfiledApi, Recorder, RecorderMode, SliceWindow, StatsCalculator,
};
pub use perfslice_scheduler::{Clock, ManualClock, SliceTask, SystemClock};
