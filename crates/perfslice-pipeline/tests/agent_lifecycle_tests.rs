//! Agent lifecycle tests with real worker threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use perfslice_pipeline::prelude::*;
use perfslice_scheduler::{FnTask, TaskError};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const T0: i64 = 1_700_000_000_000;

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn fast_config() -> Result<AgentConfig, ConfigError> {
    AgentConfig::builder()
        .slice_ms(1_000)
        .rotation_poll_ms(1)
        .aggregation_poll_ms(1)
        .build()
}

#[test]
fn test_workers_rotate_and_deliver() -> TestResult {
    let clock = Arc::new(ManualClock::new(T0));
    let sink = Arc::new(MemorySink::new());
    let agent = PerfAgent::builder(fast_config()?)
        .api_named("OrderService.place")
        .clock(clock.clone())
        .sink(sink.clone())
        .build()?;

    agent.start()?;
    assert!(agent.is_running());
    assert!(wait_for(Duration::from_secs(5), || agent.scheduler_stats().polls > 0));

    for cost in 1..=10 {
        agent.record("OrderService.place", cost)?;
    }
    clock.set(T0 + 1_000);

    assert!(wait_for(Duration::from_secs(5), || sink.len() == 1));
    agent.stop()?;
    assert!(!agent.is_running());

    let batches = sink.batches();
    let batch = batches.first().ok_or("no batch delivered")?;
    assert_eq!(batch.window, SliceWindow::new(T0, T0 + 1_000));
    assert_eq!(batch.total_count(), 10);
    assert_eq!(agent.scheduler_stats().fires, 1);
    Ok(())
}

#[test]
fn test_extra_tasks_fire_after_rotation() -> TestResult {
    let clock = Arc::new(ManualClock::new(T0));
    let fired_at = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&fired_at);
    let task = FnTask::new("slice-end-hook", move |start, slice| {
        let end = u64::try_from(start + slice).map_err(|err| TaskError::failed(err.to_string()))?;
        seen.store(end, Ordering::Release);
        Ok(())
    });

    let agent = PerfAgent::builder(fast_config()?)
        .api_named("A.b")
        .clock(clock.clone())
        .sink(Arc::new(MemorySink::new()))
        .task(Arc::new(task))
        .build()?;

    agent.start()?;
    assert!(wait_for(Duration::from_secs(5), || agent.scheduler_stats().polls > 0));
    clock.set(T0 + 1_000);
    assert!(wait_for(Duration::from_secs(5), || fired_at.load(Ordering::Acquire) != 0));
    agent.stop()?;

    assert_eq!(fired_at.load(Ordering::Acquire), u64::try_from(T0 + 1_000)?);
    assert_eq!(agent.metrics().rotations, 1);
    assert_eq!(agent.scheduler_stats().task_runs, 2);
    Ok(())
}

#[test]
fn test_start_twice_is_rejected() -> TestResult {
    let agent = PerfAgent::builder(fast_config()?)
        .api_named("A.b")
        .clock(Arc::new(ManualClock::new(T0)))
        .sink(Arc::new(MemorySink::new()))
        .build()?;

    agent.start()?;
    assert!(matches!(agent.start(), Err(PipelineError::AlreadyRunning)));
    agent.stop()?;
    // Stopping an idle agent is a no-op.
    agent.stop()?;
    Ok(())
}

#[test]
fn test_disabled_agent_still_records() -> TestResult {
    let config = AgentConfig::builder().enabled(false).build()?;
    let agent = PerfAgent::builder(config).api_named("A.b").build()?;
    agent.start()?;
    assert!(!agent.is_running());

    agent.record("A.b", 7)?;
    assert_eq!(agent.get_recorder("A.b").map(Recorder::total_count), Some(1));
    Ok(())
}

#[test]
fn test_drop_stops_workers() -> TestResult {
    let agent = PerfAgent::builder(fast_config()?)
        .api_named("A.b")
        .sink(Arc::new(MemorySink::new()))
        .build()?;
    agent.start()?;
    drop(agent);
    Ok(())
}

#[test]
fn test_async_sink_behind_agent() -> TestResult {
    let clock = Arc::new(ManualClock::new(T0));
    let memory = Arc::new(MemorySink::new());
    let sink = Arc::new(AsyncSink::new(memory.clone(), 4)?);
    let agent = PerfAgent::builder(AgentConfig::builder().slice_ms(1_000).build()?)
        .api_named("A.b")
        .clock(clock.clone())
        .sink(sink.clone())
        .build()?;

    for slice in 1..=3_i64 {
        agent.record("A.b", 5)?;
        clock.set(T0 + slice * 1_000);
        agent.rotate_now();
        assert!(agent.pump_now().is_delivered());
    }

    assert!(wait_for(Duration::from_secs(5), || memory.len() == 3));
    assert_eq!(sink.dropped(), 0);
    Ok(())
}
