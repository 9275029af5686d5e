//! Generation rotation.
//!
//! [`RotationCoordinator`] runs once per slice boundary as a [`SliceTask`] on
//! the shared scheduler. It closes the active generation, prepares the standby
//! one, swaps them and hands the closed generation to the aggregation pump.

use std::sync::Arc;

use perfslice_recorder::SliceWindow;
use perfslice_scheduler::{SliceTask, TaskResult};
use tracing::{debug, warn};

use crate::handoff::HandoffSignal;
use crate::metrics::PipelineMetrics;
use crate::registry::RecorderRegistry;

/// Task name the coordinator registers under.
pub const ROTATION_TASK_NAME: &str = "recorder-rotation";

/// What one rotation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    /// Window `[now - slice, now)` of the generation just closed.
    pub closed: SliceWindow,
    /// Window `[now, now + slice)` of the generation just opened.
    pub opened: SliceWindow,
    /// Closed-generation recorders that had never been stamped.
    pub boot_stamped: usize,
    /// The previous handoff was still pending when this rotation started.
    pub overrun: bool,
    /// Index of the generation now receiving writes.
    pub active_index: usize,
}

/// Swaps recorder generations at slice boundaries.
#[derive(Debug)]
pub struct RotationCoordinator {
    registry: Arc<RecorderRegistry>,
    handoff: Arc<HandoffSignal>,
    metrics: Arc<PipelineMetrics>,
}

impl RotationCoordinator {
    /// Coordinator over `registry`, signalling through `handoff`.
    #[must_use]
    pub fn new(
        registry: Arc<RecorderRegistry>,
        handoff: Arc<HandoffSignal>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            registry,
            handoff,
            metrics,
        }
    }

    /// Rotate at wall-clock time `now_ms` for a slice of `slice_ms`.
    ///
    /// Must only be called from one thread at a time; the scheduler guarantees
    /// that for the registered task.
    pub fn rotate(&self, now_ms: i64, slice_ms: i64) -> RotationReport {
        let closed = SliceWindow::new(now_ms.saturating_sub(slice_ms), now_ms);
        let opened = SliceWindow::starting_at(now_ms, slice_ms);

        // Recorders that were active since boot never got a window.
        let boot_stamped = self.registry.active().stamp_unstamped(closed);
        if boot_stamped > 0 {
            self.metrics
                .add_boot_stamps(u64::try_from(boot_stamped).unwrap_or(u64::MAX));
        }

        let overrun = self.handoff.is_raised();
        if overrun {
            self.metrics.inc_overruns();
            warn!(
                window_start = closed.start_ms,
                window_stop = closed.stop_ms,
                "Aggregation has not finished the previous slice; its generation is being reused"
            );
        }

        self.registry.standby().reset_and_stamp(opened);
        let active_index = self.registry.swap();
        self.handoff.raise();
        self.metrics.inc_rotations();

        debug!(
            window_start = closed.start_ms,
            window_stop = closed.stop_ms,
            active_index,
            boot_stamped,
            "Recorder generations rotated"
        );

        RotationReport {
            closed,
            opened,
            boot_stamped,
            overrun,
            active_index,
        }
    }
}

impl SliceTask for RotationCoordinator {
    fn name(&self) -> &str {
        ROTATION_TASK_NAME
    }

    fn run(&self, last_slice_start_ms: i64, slice_ms: i64) -> TaskResult {
        self.rotate(last_slice_start_ms.saturating_add(slice_ms), slice_ms);
        Ok(())
    }
}
