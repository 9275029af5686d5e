//! The agent context.
//!
//! [`PerfAgent`] owns the registry, handoff, metrics, rotation scheduler and
//! aggregation pump for one process. It is built once at startup and passed to
//! the call sites that record; nothing here is global.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use perfslice_recorder::{PercentileCalculator, ProfiledApi, Recorder, StatsCalculator};
use perfslice_scheduler::{
    Clock, PollHandle, PollLoop, SchedulerSnapshot, SchedulerStats, SliceTask, SystemClock,
    TimeSlicedScheduler,
};
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::handoff::HandoffSignal;
use crate::metrics::{PipelineMetrics, PipelineSnapshot};
use crate::pump::{AggregationPump, PumpOutcome};
use crate::registry::RecorderRegistry;
use crate::rotation::{RotationCoordinator, RotationReport};
use crate::sink::{LogSink, StatsSink};

struct Workers {
    rotation: PollHandle,
    aggregation: PollHandle,
}

/// In-process performance agent.
///
/// # Thread Safety
///
/// `record` and `get_recorder` are wait-free and callable from any thread.
/// `pump_now` may run beside the aggregation worker: only one pass claims a
/// rotated generation, so each slice reaches the sink at most once.
/// `start`, `stop` and `rotate_now` are meant for the owning thread; calling
/// `rotate_now` while the workers run races the scheduler.
pub struct PerfAgent {
    config: AgentConfig,
    registry: Arc<RecorderRegistry>,
    handoff: Arc<HandoffSignal>,
    metrics: Arc<PipelineMetrics>,
    scheduler_stats: Arc<SchedulerStats>,
    rotation: Arc<RotationCoordinator>,
    pump: Arc<AggregationPump>,
    clock: Arc<dyn Clock>,
    extra_tasks: Vec<Arc<dyn SliceTask>>,
    workers: Mutex<Option<Workers>>,
}

impl PerfAgent {
    /// Start building an agent for `config`.
    #[must_use]
    pub fn builder(config: AgentConfig) -> PerfAgentBuilder {
        PerfAgentBuilder::new(config)
    }

    /// Spawn the rotation and aggregation workers.
    ///
    /// Does nothing when the configuration disables the agent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] if the workers are running, or
    /// a scheduler error if a thread cannot be spawned.
    pub fn start(&self) -> PipelineResult<()> {
        if !self.config.enabled {
            info!("perfslice agent disabled; workers not started");
            return Ok(());
        }

        let mut workers = self.workers.lock();
        if workers.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let rotation_task: Arc<dyn SliceTask> = self.rotation.clone();
        let scheduler = TimeSlicedScheduler::builder("rotation")
            .slice_ms(self.config.slice_ms)
            .task(rotation_task)
            .tasks(self.extra_tasks.iter().cloned())
            .stats(Arc::clone(&self.scheduler_stats))
            .build();
        let slice_ms = scheduler.slice_ms();
        let rotation = scheduler.spawn(
            Arc::clone(&self.clock),
            Duration::from_millis(self.config.rotation_poll_ms),
        )?;

        let pump = Arc::clone(&self.pump);
        let aggregation = PollLoop::new(
            "perfslice-aggregation",
            Duration::from_millis(self.config.aggregation_poll_ms),
        )
        .spawn(move || {
            pump.pump_once();
        })?;

        *workers = Some(Workers {
            rotation,
            aggregation,
        });
        info!(
            slice_ms,
            apis = self.registry.len(),
            mode = %self.config.recorder_mode,
            "perfslice agent started"
        );
        Ok(())
    }

    /// Stop both workers, letting an in-flight tick finish.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while joining a worker.
    pub fn stop(&self) -> PipelineResult<()> {
        let Some(workers) = self.workers.lock().take() else {
            return Ok(());
        };

        let rotation = workers.rotation.stop();
        let aggregation = workers.aggregation.stop();
        info!("perfslice agent stopped");
        rotation?;
        aggregation?;
        Ok(())
    }

    /// Whether the workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Active recorder for `api`. Wait-free.
    #[inline]
    #[must_use]
    pub fn get_recorder(&self, api: &str) -> Option<&dyn Recorder> {
        self.registry.get_recorder(api)
    }

    /// Record one call of `api` that took `cost_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownApi`] if `api` was not registered.
    #[inline]
    pub fn record(&self, api: &str, cost_ms: u64) -> PipelineResult<()> {
        let recorder = self
            .get_recorder(api)
            .ok_or_else(|| PipelineError::unknown_api(api))?;
        recorder.record(cost_ms);
        Ok(())
    }

    /// Rotate immediately, using the agent clock as the slice end.
    pub fn rotate_now(&self) -> RotationReport {
        self.rotation
            .rotate(self.clock.now_millis(), self.config.effective_slice_ms())
    }

    /// Run one aggregation tick on the calling thread.
    pub fn pump_now(&self) -> PumpOutcome {
        self.pump.pump_once()
    }

    /// Pipeline counters.
    #[must_use]
    pub fn metrics(&self) -> PipelineSnapshot {
        self.metrics.snapshot()
    }

    /// Rotation scheduler counters.
    #[must_use]
    pub fn scheduler_stats(&self) -> SchedulerSnapshot {
        self.scheduler_stats.snapshot()
    }

    /// The recorder registry.
    #[must_use]
    pub fn registry(&self) -> &RecorderRegistry {
        &self.registry
    }

    /// Whether a handoff is waiting for aggregation.
    #[must_use]
    pub fn handoff_pending(&self) -> bool {
        self.handoff.is_raised()
    }

    /// The configuration the agent was built with.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

impl Drop for PerfAgent {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "perfslice agent did not stop cleanly");
        }
    }
}

impl std::fmt::Debug for PerfAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerfAgent")
            .field("config", &self.config)
            .field("apis", &self.registry.len())
            .field("running", &self.is_running())
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PerfAgent`].
pub struct PerfAgentBuilder {
    config: AgentConfig,
    apis: Vec<ProfiledApi>,
    sink: Option<Arc<dyn StatsSink>>,
    calculator: Option<Arc<dyn StatsCalculator>>,
    clock: Option<Arc<dyn Clock>>,
    tasks: Vec<Arc<dyn SliceTask>>,
}

impl PerfAgentBuilder {
    /// Builder with no APIs, logging sink, percentile calculator and system clock.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            apis: Vec::new(),
            sink: None,
            calculator: None,
            clock: None,
            tasks: Vec::new(),
        }
    }

    /// Register an API with explicit thresholds.
    #[must_use]
    pub fn api(mut self, api: ProfiledApi) -> Self {
        self.apis.push(api);
        self
    }

    /// Register an API with the configuration's default thresholds.
    #[must_use]
    pub fn api_named(mut self, name: impl Into<String>) -> Self {
        let api = self.config.profiled_api(name);
        self.apis.push(api);
        self
    }

    /// Register several APIs.
    #[must_use]
    pub fn apis(mut self, apis: impl IntoIterator<Item = ProfiledApi>) -> Self {
        self.apis.extend(apis);
        self
    }

    /// Deliver batches to `sink`.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Summarize recorders with `calculator`.
    #[must_use]
    pub fn calculator(mut self, calculator: Arc<dyn StatsCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    /// Read time from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fire `task` on the rotation scheduler, after rotation.
    #[must_use]
    pub fn task(mut self, task: Arc<dyn SliceTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Build the agent. Workers are not started.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or an API name is
    /// empty or duplicated.
    pub fn build(self) -> PipelineResult<PerfAgent> {
        self.config.validate()?;

        let registry = Arc::new(RecorderRegistry::new(&self.apis, self.config.recorder_mode)?);
        let handoff = Arc::new(HandoffSignal::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let rotation = Arc::new(RotationCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&handoff),
            Arc::clone(&metrics),
        ));
        let pump = Arc::new(AggregationPump::new(
            Arc::clone(&registry),
            Arc::clone(&handoff),
            self.calculator
                .unwrap_or_else(|| Arc::new(PercentileCalculator)),
            self.sink.unwrap_or_else(|| Arc::new(LogSink::new())),
            Arc::clone(&metrics),
        ));

        Ok(PerfAgent {
            config: self.config,
            registry,
            handoff,
            metrics,
            scheduler_stats: Arc::new(SchedulerStats::new()),
            rotation,
            pump,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            extra_tasks: self.tasks,
            workers: Mutex::new(None),
        })
    }
}

impl std::fmt::Debug for PerfAgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerfAgentBuilder")
            .field("config", &self.config)
            .field("apis", &self.apis)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
