//! Background aggregation.
//!
//! [`AggregationPump::pump_once`] is polled on its own cadence. It does nothing
//! until rotation raises the handoff signal; then it summarizes every recorder
//! of the pending generation, delivers one batch to the sink and lowers the
//! signal whatever happened along the way.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use perfslice_recorder::{PerfStat, Recorder, SliceWindow, StatsCalculator};
use perfslice_scheduler::TaskError;
use tracing::{debug, error};

use crate::handoff::HandoffSignal;
use crate::metrics::PipelineMetrics;
use crate::registry::RecorderRegistry;
use crate::sink::StatsSink;

/// Result of one pump tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// No handoff was pending.
    Idle,
    /// A handoff was pending but the generation holds no recorders.
    Empty,
    /// The sink accepted the batch.
    Delivered {
        /// Common window of the batch.
        window: SliceWindow,
        /// Stats in the batch.
        stats: usize,
        /// Recorders left out because their statistics failed.
        failures: usize,
    },
    /// The sink rejected or panicked on the batch; the slice is dropped.
    SinkFailed {
        /// Common window of the lost batch.
        window: SliceWindow,
        /// Recorders left out because their statistics failed.
        failures: usize,
    },
}

impl PumpOutcome {
    /// Whether a batch reached the sink.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Drains the pending generation into a [`StatsSink`].
pub struct AggregationPump {
    registry: Arc<RecorderRegistry>,
    handoff: Arc<HandoffSignal>,
    calculator: Arc<dyn StatsCalculator>,
    sink: Arc<dyn StatsSink>,
    metrics: Arc<PipelineMetrics>,
}

impl AggregationPump {
    /// Pump reading `registry`'s pending generation whenever `handoff` is raised.
    #[must_use]
    pub fn new(
        registry: Arc<RecorderRegistry>,
        handoff: Arc<HandoffSignal>,
        calculator: Arc<dyn StatsCalculator>,
        sink: Arc<dyn StatsSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            registry,
            handoff,
            calculator,
            sink,
            metrics,
        }
    }

    /// Run one tick.
    pub fn pump_once(&self) -> PumpOutcome {
        let Some(_pass) = self.handoff.begin() else {
            return PumpOutcome::Idle;
        };

        let pending = self.registry.standby();
        let Some(window) = pending.iter().next().map(Recorder::window) else {
            self.metrics.inc_empty_passes();
            debug!("Handoff raised for an empty generation");
            return PumpOutcome::Empty;
        };

        let started = Instant::now();
        let mut stats = Vec::with_capacity(pending.len());
        let mut failures = 0_usize;
        for recorder in pending.iter() {
            match self.summarize(recorder) {
                Some(stat) => stats.push(stat),
                None => failures = failures.saturating_add(1),
            }
        }
        self.metrics
            .add_stats_computed(u64::try_from(stats.len()).unwrap_or(u64::MAX));
        self.metrics
            .add_stat_failures(u64::try_from(failures).unwrap_or(u64::MAX));

        let delivered = self.deliver(&stats, window);
        debug!(
            window_start = window.start_ms,
            window_stop = window.stop_ms,
            stats = stats.len(),
            failures,
            cost_ms = started.elapsed().as_millis(),
            "Aggregation pass finished"
        );

        if delivered {
            PumpOutcome::Delivered {
                window,
                stats: stats.len(),
                failures,
            }
        } else {
            PumpOutcome::SinkFailed { window, failures }
        }
    }

    fn summarize(&self, recorder: &dyn Recorder) -> Option<PerfStat> {
        let window = recorder.window();
        match catch_unwind(AssertUnwindSafe(|| self.calculator.calculate(recorder))) {
            Ok(Ok(stat)) => Some(stat),
            Ok(Err(err)) => {
                error!(
                    api = recorder.api(),
                    window_start = window.start_ms,
                    window_stop = window.stop_ms,
                    error = %err,
                    "Statistics failed; recorder left out of the batch"
                );
                None
            }
            Err(payload) => {
                let err = TaskError::from_panic(payload.as_ref());
                error!(
                    api = recorder.api(),
                    window_start = window.start_ms,
                    window_stop = window.stop_ms,
                    error = %err,
                    "Statistics panicked; recorder left out of the batch"
                );
                None
            }
        }
    }

    fn deliver(&self, stats: &[PerfStat], window: SliceWindow) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.sink.process(stats, window))) {
            Ok(Ok(())) => {
                self.metrics.inc_batches_delivered();
                true
            }
            Ok(Err(err)) => {
                self.metrics.inc_delivery_failures();
                error!(
                    window_start = window.start_ms,
                    window_stop = window.stop_ms,
                    error = %err,
                    "Sink rejected batch; slice dropped"
                );
                false
            }
            Err(payload) => {
                self.metrics.inc_delivery_failures();
                let err = TaskError::from_panic(payload.as_ref());
                error!(
                    window_start = window.start_ms,
                    window_stop = window.stop_ms,
                    error = %err,
                    "Sink panicked; slice dropped"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for AggregationPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationPump")
            .field("handoff", &self.handoff)
            .field("apis", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineResult, SinkError, SinkResult};
    use crate::rotation::RotationCoordinator;
    use crate::sink::MemorySink;
    use perfslice_recorder::{PercentileCalculator, ProfiledApi, RecorderMode, StatsError, StatsResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        registry: Arc<RecorderRegistry>,
        handoff: Arc<HandoffSignal>,
        metrics: Arc<PipelineMetrics>,
        rotation: RotationCoordinator,
    }

    impl Fixture {
        fn new(names: &[&str]) -> PipelineResult<Self> {
            let apis: Vec<ProfiledApi> = names.iter().map(|name| ProfiledApi::new(*name)).collect();
            let registry = Arc::new(RecorderRegistry::new(&apis, RecorderMode::Accurate)?);
            let handoff = Arc::new(HandoffSignal::new());
            let metrics = Arc::new(PipelineMetrics::new());
            let rotation = RotationCoordinator::new(
                Arc::clone(&registry),
                Arc::clone(&handoff),
                Arc::clone(&metrics),
            );
            Ok(Self {
                registry,
                handoff,
                metrics,
                rotation,
            })
        }

        fn pump(&self, calculator: Arc<dyn StatsCalculator>, sink: Arc<dyn StatsSink>) -> AggregationPump {
            AggregationPump::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.handoff),
                calculator,
                sink,
                Arc::clone(&self.metrics),
            )
        }
    }

    struct FailingFor(&'static str);

    impl StatsCalculator for FailingFor {
        fn calculate(&self, recorder: &dyn Recorder) -> StatsResult<PerfStat> {
            if recorder.api() == self.0 {
                return Err(StatsError::failed(recorder.api(), "histogram unavailable"));
            }
            PercentileCalculator.calculate(recorder)
        }
    }

    struct PanickingFor(&'static str);

    impl StatsCalculator for PanickingFor {
        fn calculate(&self, recorder: &dyn Recorder) -> StatsResult<PerfStat> {
            if recorder.api() == self.0 {
                std::panic::panic_any("histogram corrupted");
            }
            PercentileCalculator.calculate(recorder)
        }
    }

    /// Panics on its first batch, then forwards to memory.
    struct PanicOnceSink {
        armed: AtomicBool,
        inner: MemorySink,
    }

    impl StatsSink for PanicOnceSink {
        fn process(&self, stats: &[PerfStat], window: SliceWindow) -> SinkResult<()> {
            if self.armed.swap(false, Ordering::AcqRel) {
                std::panic::panic_any("downstream exploded");
            }
            self.inner.process(stats, window)
        }
    }

    struct RejectingSink;

    impl StatsSink for RejectingSink {
        fn process(&self, _stats: &[PerfStat], _window: SliceWindow) -> SinkResult<()> {
            Err(SinkError::rejected("downstream offline"))
        }
    }

    #[test]
    fn test_idle_without_handoff() -> PipelineResult<()> {
        let fixture = Fixture::new(&["A.b"])?;
        let sink = Arc::new(MemorySink::new());
        let pump = fixture.pump(Arc::new(PercentileCalculator), sink.clone());
        assert_eq!(pump.pump_once(), PumpOutcome::Idle);
        assert!(sink.is_empty());
        Ok(())
    }

    #[test]
    fn test_delivers_one_batch_per_handoff() -> PipelineResult<()> {
        let fixture = Fixture::new(&["A.b", "A.c"])?;
        let sink = Arc::new(MemorySink::new());
        let pump = fixture.pump(Arc::new(PercentileCalculator), sink.clone());

        if let Some(recorder) = fixture.registry.get_recorder("A.b") {
            recorder.record(12);
        }
        fixture.rotation.rotate(T0 + 1_000, 1_000);

        let outcome = pump.pump_once();
        assert_eq!(
            outcome,
            PumpOutcome::Delivered {
                window: SliceWindow::new(T0, T0 + 1_000),
                stats: 2,
                failures: 0,
            }
        );
        assert!(!fixture.handoff.is_raised());
        assert_eq!(pump.pump_once(), PumpOutcome::Idle);
        assert_eq!(sink.len(), 1);
        Ok(())
    }

    #[test]
    fn test_failing_recorder_is_skipped_and_signal_cleared() -> PipelineResult<()> {
        let fixture = Fixture::new(&["A.b", "A.broken", "A.c"])?;
        let sink = Arc::new(MemorySink::new());
        let pump = fixture.pump(Arc::new(FailingFor("A.broken")), sink.clone());

        fixture.rotation.rotate(T0 + 1_000, 1_000);
        let outcome = pump.pump_once();

        assert!(matches!(outcome, PumpOutcome::Delivered { stats: 2, failures: 1, .. }));
        assert!(!fixture.handoff.is_raised());
        let apis: Vec<String> = sink
            .batches()
            .iter()
            .flat_map(|batch| batch.stats.iter().map(|stat| stat.api.clone()))
            .collect();
        assert_eq!(apis, vec!["A.b".to_string(), "A.c".to_string()]);
        assert_eq!(fixture.metrics.snapshot().stat_failures, 1);
        Ok(())
    }

    #[test]
    fn test_sink_failure_still_clears_signal() -> PipelineResult<()> {
        let fixture = Fixture::new(&["A.b"])?;
        let pump = fixture.pump(Arc::new(PercentileCalculator), Arc::new(RejectingSink));

        fixture.rotation.rotate(T0 + 1_000, 1_000);
        let outcome = pump.pump_once();

        assert!(matches!(outcome, PumpOutcome::SinkFailed { failures: 0, .. }));
        assert!(!fixture.handoff.is_raised());
        assert_eq!(fixture.metrics.snapshot().delivery_failures, 1);
        Ok(())
    }

    #[test]
    fn test_empty_generation_delivers_nothing() -> PipelineResult<()> {
        let fixture = Fixture::new(&[])?;
        let sink = Arc::new(MemorySink::new());
        let pump = fixture.pump(Arc::new(PercentileCalculator), sink.clone());

        fixture.rotation.rotate(T0 + 1_000, 1_000);
        assert_eq!(pump.pump_once(), PumpOutcome::Empty);
        assert!(!fixture.handoff.is_raised());
        assert!(sink.is_empty());
        assert_eq!(fixture.metrics.snapshot().empty_passes, 1);
        Ok(())
    }

    #[test]
    fn test_panicking_calculator_is_isolated() -> PipelineResult<()> {
        let fixture = Fixture::new(&["A.b", "A.bad"])?;
        let sink = Arc::new(MemorySink::new());
        let pump = fixture.pump(Arc::new(PanickingFor("A.bad")), sink.clone());

        fixture.rotation.rotate(T0 + 1_000, 1_000);
        let outcome = pump.pump_once();
        assert!(matches!(outcome, PumpOutcome::Delivered { stats: 1, failures: 1, .. }));
        assert!(!fixture.handoff.is_raised());
        assert_eq!(fixture.metrics.snapshot().stat_failures, 1);

        fixture.rotation.rotate(T0 + 2_000, 1_000);
        assert!(pump.pump_once().is_delivered());
        assert_eq!(sink.len(), 2);
        assert_eq!(fixture.metrics.snapshot().overruns, 0);
        Ok(())
    }

    #[test]
    fn test_panicking_sink_drops_slice_and_recovers() -> PipelineResult<()> {
        let fixture = Fixture::new(&["A.b"])?;
        let sink = Arc::new(PanicOnceSink {
            armed: AtomicBool::new(true),
            inner: MemorySink::new(),
        });
        let pump = fixture.pump(Arc::new(PercentileCalculator), sink.clone());

        fixture.rotation.rotate(T0 + 1_000, 1_000);
        let outcome = pump.pump_once();
        assert!(matches!(outcome, PumpOutcome::SinkFailed { failures: 0, .. }));
        assert!(!fixture.handoff.is_raised());
        assert_eq!(fixture.metrics.snapshot().delivery_failures, 1);

        fixture.rotation.rotate(T0 + 2_000, 1_000);
        let outcome = pump.pump_once();
        assert_eq!(
            outcome,
            PumpOutcome::Delivered {
                window: SliceWindow::new(T0 + 1_000, T0 + 2_000),
                stats: 1,
                failures: 0,
            }
        );
        assert_eq!(sink.inner.len(), 1);
        assert_eq!(fixture.metrics.snapshot().batches_delivered, 1);
        Ok(())
    }
}
