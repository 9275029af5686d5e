//! Consumers of finished statistics batches.
//!
//! The pump calls [`StatsSink::process`] at most once per completed slice, on
//! the aggregation thread. Sinks that may be slow should be wrapped in an
//! [`AsyncSink`] so a stalled consumer cannot hold the handoff signal.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use perfslice_recorder::{PerfStat, SliceWindow};
use perfslice_scheduler::TaskError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{SinkError, SinkResult};

/// Receives the statistics of one completed slice.
pub trait StatsSink: Send + Sync {
    /// Consume `stats`, all covering `window`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the pump; the batch is not retried.
    fn process(&self, stats: &[PerfStat], window: SliceWindow) -> SinkResult<()>;
}

/// One slice's statistics, owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfStatBatch {
    /// Common window of every stat.
    pub window: SliceWindow,
    /// One entry per recorder, in registration order.
    pub stats: Vec<PerfStat>,
}

impl PerfStatBatch {
    /// Copy a borrowed batch.
    #[must_use]
    pub fn new(stats: &[PerfStat], window: SliceWindow) -> Self {
        Self {
            window,
            stats: stats.to_vec(),
        }
    }

    /// Sum of call counts over the batch.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.stats
            .iter()
            .map(|stat| stat.total_count)
            .fold(0_u64, u64::saturating_add)
    }

    /// Stat for `api`, if present.
    #[must_use]
    pub fn get(&self, api: &str) -> Option<&PerfStat> {
        self.stats.iter().find(|stat| stat.api == api)
    }
}

/// Writes one structured `info!` event per stat.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink {
    skip_idle: bool,
}

impl LogSink {
    /// Log every stat, including APIs with no calls.
    #[must_use]
    pub const fn new() -> Self {
        Self { skip_idle: false }
    }

    /// Leave out APIs that recorded nothing during the slice.
    #[must_use]
    pub const fn skip_idle(mut self) -> Self {
        self.skip_idle = true;
        self
    }
}

impl StatsSink for LogSink {
    fn process(&self, stats: &[PerfStat], window: SliceWindow) -> SinkResult<()> {
        for stat in stats {
            if self.skip_idle && !stat.has_calls() {
                continue;
            }
            let payload = serde_json::to_string(stat)?;
            info!(
                target: "perfslice::stats",
                api = %stat.api,
                window_start = window.start_ms,
                window_stop = window.stop_ms,
                total_count = stat.total_count,
                tp99 = stat.tp99,
                %payload,
                "Slice statistics"
            );
        }
        Ok(())
    }
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<PerfStatBatch>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all batches received so far.
    #[must_use]
    pub fn batches(&self) -> Vec<PerfStatBatch> {
        self.batches.lock().clone()
    }

    /// Remove and return all batches received so far.
    pub fn take(&self) -> Vec<PerfStatBatch> {
        std::mem::take(&mut *self.batches.lock())
    }

    /// Number of batches held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    /// Whether no batch has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }
}

impl StatsSink for MemorySink {
    fn process(&self, stats: &[PerfStat], window: SliceWindow) -> SinkResult<()> {
        self.batches.lock().push(PerfStatBatch::new(stats, window));
        Ok(())
    }
}

/// Forwards batches over a bounded channel without blocking.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<PerfStatBatch>,
}

impl ChannelSink {
    /// Sink plus the receiving end of a channel holding `capacity` batches.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<PerfStatBatch>) {
        let (sender, receiver) = channel::bounded(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl StatsSink for ChannelSink {
    fn process(&self, stats: &[PerfStat], window: SliceWindow) -> SinkResult<()> {
        match self.sender.try_send(PerfStatBatch::new(stats, window)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_batch)) => Err(SinkError::QueueFull),
            Err(TrySendError::Disconnected(_batch)) => Err(SinkError::Disconnected),
        }
    }
}

/// Counters kept by an [`AsyncSink`].
#[derive(Debug, Default)]
struct AsyncSinkCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Hands batches to a worker thread that drives the wrapped sink.
///
/// The queue holds at most `capacity` batches. When it is full the oldest
/// queued batch is discarded to make room for the newest one.
pub struct AsyncSink {
    sender: Option<Sender<PerfStatBatch>>,
    // Second receiver used only to evict the oldest batch on overflow.
    evictor: Receiver<PerfStatBatch>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<AsyncSinkCounters>,
}

impl AsyncSink {
    /// Wrap `inner` behind a queue of `capacity` batches.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Spawn`] if the worker thread cannot be started.
    pub fn new(inner: Arc<dyn StatsSink>, capacity: usize) -> SinkResult<Self> {
        let (sender, receiver) = channel::bounded::<PerfStatBatch>(capacity.max(1));
        let evictor = receiver.clone();
        let counters = Arc::new(AsyncSinkCounters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = thread::Builder::new()
            .name("perfslice-sink".to_string())
            .spawn(move || {
                for batch in receiver.iter() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        inner.process(&batch.stats, batch.window)
                    }));
                    match outcome {
                        Ok(Ok(())) => {
                            worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(err)) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            error!(
                                window_start = batch.window.start_ms,
                                window_stop = batch.window.stop_ms,
                                error = %err,
                                "Wrapped sink failed"
                            );
                        }
                        Err(payload) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            let err = TaskError::from_panic(payload.as_ref());
                            error!(
                                window_start = batch.window.start_ms,
                                window_stop = batch.window.stop_ms,
                                error = %err,
                                "Wrapped sink panicked"
                            );
                        }
                    }
                }
                debug!("Sink worker drained");
            })
            .map_err(SinkError::Spawn)?;

        Ok(Self {
            sender: Some(sender),
            evictor,
            worker: Some(worker),
            counters,
        })
    }

    /// Batches the wrapped sink accepted.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Batches discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Batches the wrapped sink rejected or panicked on.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Batches waiting for the worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.evictor.len()
    }

    /// Stop accepting batches, let the worker drain the queue and join it.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the only sender ends the worker's receive loop.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Sink worker exited by panic");
        }
    }
}

impl StatsSink for AsyncSink {
    fn process(&self, stats: &[PerfStat], window: SliceWindow) -> SinkResult<()> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(SinkError::Disconnected);
        };

        let mut batch = PerfStatBatch::new(stats, window);
        loop {
            match sender.try_send(batch) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_batch)) => return Err(SinkError::Disconnected),
                Err(TrySendError::Full(rejected)) => {
                    batch = rejected;
                    match self.evictor.try_recv() {
                        Ok(oldest) => {
                            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                window_start = oldest.window.start_ms,
                                window_stop = oldest.window.stop_ms,
                                "Sink queue full; dropped oldest batch"
                            );
                        }
                        // The worker took one in the meantime.
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return Err(SinkError::Disconnected),
                    }
                }
            }
        }
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AsyncSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSink")
            .field("pending", &self.pending())
            .field("delivered", &self.delivered())
            .field("dropped", &self.dropped())
            .field("failed", &self.failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const WINDOW: SliceWindow = SliceWindow::new(1_700_000_000_000, 1_700_000_060_000);

    fn stat(api: &str, total_count: u64) -> PerfStat {
        PerfStat {
            api: api.to_string(),
            window: WINDOW,
            total_count,
            ..PerfStat::default()
        }
    }

    #[test]
    fn test_memory_sink_keeps_batches() -> TestResult {
        let sink = MemorySink::new();
        sink.process(&[stat("A.b", 3), stat("A.c", 4)], WINDOW)?;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches.first().map(PerfStatBatch::total_count), Some(7));
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
        Ok(())
    }

    #[test]
    fn test_log_sink_accepts_batches() -> TestResult {
        LogSink::new().process(&[stat("A.b", 1)], WINDOW)?;
        LogSink::new().skip_idle().process(&[stat("A.idle", 0)], WINDOW)?;
        Ok(())
    }

    #[test]
    fn test_channel_sink_reports_full_and_disconnected() -> TestResult {
        let (sink, receiver) = ChannelSink::bounded(1);
        sink.process(&[stat("A.b", 1)], WINDOW)?;
        assert!(matches!(
            sink.process(&[stat("A.b", 2)], WINDOW),
            Err(SinkError::QueueFull)
        ));

        let batch = receiver.recv()?;
        assert_eq!(batch.get("A.b").map(|s| s.total_count), Some(1));

        drop(receiver);
        assert!(matches!(
            sink.process(&[stat("A.b", 3)], WINDOW),
            Err(SinkError::Disconnected)
        ));
        Ok(())
    }

    #[test]
    fn test_async_sink_delivers_in_order() -> TestResult {
        let memory = Arc::new(MemorySink::new());
        let sink = AsyncSink::new(memory.clone(), 4)?;
        for count in 1..=3 {
            sink.process(&[stat("A.b", count)], WINDOW)?;
        }
        sink.close();

        let counts: Vec<u64> = memory.batches().iter().map(PerfStatBatch::total_count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        Ok(())
    }

    struct GatedSink {
        gate: Receiver<()>,
        seen: Mutex<Vec<u64>>,
    }

    impl StatsSink for GatedSink {
        fn process(&self, stats: &[PerfStat], _window: SliceWindow) -> SinkResult<()> {
            self.gate.recv_timeout(Duration::from_secs(5)).map_err(|_timeout| SinkError::rejected("gate timed out"))?;
            self.seen
                .lock()
                .extend(stats.iter().map(|stat| stat.total_count));
            Ok(())
        }
    }

    #[test]
    fn test_async_sink_drops_oldest_when_full() -> TestResult {
        let (open, gate) = channel::unbounded();
        let inner = Arc::new(GatedSink {
            gate,
            seen: Mutex::new(Vec::new()),
        });
        let sink = AsyncSink::new(inner.clone(), 2)?;

        // The worker picks up batch 1 and blocks on the gate.
        sink.process(&[stat("A.b", 1)], WINDOW)?;
        while sink.pending() > 0 {
            thread::yield_now();
        }
        for count in 2..=5 {
            sink.process(&[stat("A.b", count)], WINDOW)?;
        }
        assert_eq!(sink.dropped(), 2);

        for _ in 0..3 {
            open.send(())?;
        }
        sink.close();

        assert_eq!(*inner.seen.lock(), vec![1, 4, 5]);
        Ok(())
    }
}
