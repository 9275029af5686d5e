//! Concurrency tests for the rotation pipeline.
//!
//! Writers record while rotations happen underneath them; every observation
//! must end up in exactly one batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use perfslice_pipeline::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const T0: i64 = 1_700_000_000_000;

#[test]
fn test_no_observation_lost_across_rotations() -> TestResult {
    const WRITERS: usize = 4;

    let clock = Arc::new(ManualClock::new(T0));
    let sink = Arc::new(MemorySink::new());
    let config = AgentConfig::builder().slice_ms(1_000).build()?;
    let agent = Arc::new(
        PerfAgent::builder(config)
            .api_named("A.b")
            .api_named("A.c")
            .clock(clock.clone())
            .sink(sink.clone())
            .build()?,
    );

    let running = Arc::new(AtomicBool::new(true));
    let paused = Arc::new(AtomicBool::new(false));
    let parked = Arc::new(AtomicUsize::new(0));
    let recorded = Arc::new(AtomicU64::new(0));
    let writers: Vec<_> = (0..WRITERS)
        .map(|thread_id| {
            let agent = Arc::clone(&agent);
            let running = Arc::clone(&running);
            let paused = Arc::clone(&paused);
            let parked = Arc::clone(&parked);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || {
                let api = if thread_id % 2 == 0 { "A.b" } else { "A.c" };
                let mut i = 0_u64;
                while running.load(Ordering::Acquire) {
                    if paused.load(Ordering::Acquire) {
                        parked.fetch_add(1, Ordering::AcqRel);
                        while paused.load(Ordering::Acquire) && running.load(Ordering::Acquire) {
                            thread::yield_now();
                        }
                        parked.fetch_sub(1, Ordering::AcqRel);
                        continue;
                    }
                    if agent.record(api, i % 1_500).is_ok() {
                        recorded.fetch_add(1, Ordering::Relaxed);
                    }
                    i = i.wrapping_add(1);
                }
            })
        })
        .collect();

    for slice in 1..=20_i64 {
        thread::sleep(Duration::from_millis(2));
        // Rotate underneath running writers.
        clock.set(T0 + slice * 1_000);
        agent.rotate_now();

        // Writers that grabbed the old generation finish before aggregation reads it.
        paused.store(true, Ordering::Release);
        while parked.load(Ordering::Acquire) < WRITERS {
            thread::yield_now();
        }
        agent.pump_now();
        paused.store(false, Ordering::Release);
    }

    running.store(false, Ordering::Release);
    for handle in writers {
        assert!(handle.join().is_ok(), "writer panicked unexpectedly");
    }

    // Flush whatever landed in the last active generation.
    clock.set(T0 + 21_000);
    agent.rotate_now();
    agent.pump_now();

    let delivered: u64 = sink.batches().iter().map(PerfStatBatch::total_count).sum();
    assert_eq!(delivered, recorded.load(Ordering::Relaxed));
    assert_eq!(sink.len(), 21);
    assert_eq!(agent.metrics().overruns, 0);
    Ok(())
}

/// Sink that blocks until released, simulating slow downstream aggregation.
struct SlowSink {
    release: AtomicBool,
    calls: AtomicU64,
}

impl StatsSink for SlowSink {
    fn process(&self, _stats: &[PerfStat], _window: SliceWindow) -> SinkResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.release.load(Ordering::Acquire) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

#[test]
fn test_slow_aggregation_overrun_is_detected() -> TestResult {
    let clock = Arc::new(ManualClock::new(T0));
    let sink = Arc::new(SlowSink {
        release: AtomicBool::new(false),
        calls: AtomicU64::new(0),
    });
    let config = AgentConfig::builder().slice_ms(1_000).build()?;
    let agent = Arc::new(
        PerfAgent::builder(config)
            .api_named("A.b")
            .clock(clock.clone())
            .sink(sink.clone())
            .build()?,
    );

    clock.set(T0 + 1_000);
    agent.rotate_now();

    let pump_agent = Arc::clone(&agent);
    let pump = thread::spawn(move || pump_agent.pump_now());

    // Wait until the pump is stuck inside the sink.
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.calls.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
        thread::yield_now();
    }
    assert_eq!(sink.calls.load(Ordering::Relaxed), 1);

    clock.set(T0 + 2_000);
    let report = agent.rotate_now();
    assert!(report.overrun);
    assert_eq!(agent.metrics().overruns, 1);

    sink.release.store(true, Ordering::Release);
    let outcome = pump.join().map_err(|_panic| "pump thread panicked")?;
    assert!(outcome.is_delivered());

    // The slow pass lowered the signal on exit, so the overrun slice is lost
    // and the pump is idle afterwards. Nothing is stuck.
    assert!(!agent.handoff_pending());
    assert_eq!(agent.pump_now(), PumpOutcome::Idle);

    clock.set(T0 + 3_000);
    assert!(!agent.rotate_now().overrun);
    assert!(agent.pump_now().is_delivered());
    Ok(())
}

#[test]
fn test_concurrent_pumps_deliver_a_slice_once() -> TestResult {
    let clock = Arc::new(ManualClock::new(T0));
    let sink = Arc::new(SlowSink {
        release: AtomicBool::new(false),
        calls: AtomicU64::new(0),
    });
    let config = AgentConfig::builder().slice_ms(1_000).build()?;
    let agent = Arc::new(
        PerfAgent::builder(config)
            .api_named("A.b")
            .clock(clock.clone())
            .sink(sink.clone())
            .build()?,
    );
    agent.record("A.b", 4)?;

    clock.set(T0 + 1_000);
    agent.rotate_now();

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let pumps: Vec<_> = (0..2)
        .map(|_| {
            let agent = Arc::clone(&agent);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                agent.pump_now()
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.calls.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(50));
    sink.release.store(true, Ordering::Release);

    let mut outcomes = Vec::new();
    for pump in pumps {
        outcomes.push(pump.join().map_err(|_panic| "pump thread panicked")?);
    }

    assert_eq!(sink.calls.load(Ordering::Relaxed), 1);
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_delivered()).count(), 1);
    assert!(outcomes.contains(&PumpOutcome::Idle));
    assert_eq!(agent.metrics().batches_delivered, 1);
    assert!(!agent.handoff_pending());
    Ok(())
}
