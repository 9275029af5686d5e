//! Synthetic traffic against a handful of demo APIs.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use perfslice_pipeline::{AgentConfig, PerfAgent};
use perfslice_recorder::ProfiledApi;
use rand::Rng;
use tracing::debug;

/// APIs the demo registers, with their typical latency in milliseconds.
pub const DEMO_APIS: [(&str, u64); 4] = [
    ("OrderService.place", 40),
    ("OrderService.cancel", 15),
    ("UserService.find", 5),
    ("ReportService.render", 250),
];

/// Registration entries for [`DEMO_APIS`] using `config`'s thresholds.
#[must_use]
pub fn demo_apis(config: &AgentConfig) -> Vec<ProfiledApi> {
    DEMO_APIS
        .iter()
        .map(|(name, _)| config.profiled_api(*name))
        .collect()
}

/// Shape of the generated traffic.
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    /// Writer threads.
    pub threads: usize,
    /// How long each writer runs.
    pub duration: Duration,
    /// Pause between two calls of one writer.
    pub pause: Duration,
}

/// One latency sample around `typical_ms`, with an occasional slow outlier.
fn sample_cost(rng: &mut impl Rng, typical_ms: u64) -> u64 {
    let spread = typical_ms.max(1);
    let base = rng.random_range(typical_ms / 2..=typical_ms.saturating_add(spread));
    if rng.random_ratio(1, 200) {
        base.saturating_mul(rng.random_range(5..=40))
    } else {
        base
    }
}

/// Run `workload` against `agent` and return how many calls were recorded.
///
/// # Errors
///
/// Returns an error if a writer thread cannot be spawned, panics, or records
/// into an API the agent does not know.
pub fn run(agent: &Arc<PerfAgent>, workload: Workload) -> Result<u64> {
    let deadline = Instant::now() + workload.duration;

    let handles = (0..workload.threads.max(1))
        .map(|index| {
            let agent = Arc::clone(agent);
            thread::Builder::new()
                .name(format!("perfslice-writer-{index}"))
                .spawn(move || -> Result<u64> {
                    let mut rng = rand::rng();
                    let mut calls = 0_u64;
                    while Instant::now() < deadline {
                        let slot = rng.random_range(0..DEMO_APIS.len());
                        if let Some((api, typical_ms)) = DEMO_APIS.get(slot) {
                            agent.record(api, sample_cost(&mut rng, *typical_ms))?;
                            calls = calls.saturating_add(1);
                        }
                        if !workload.pause.is_zero() {
                            thread::sleep(workload.pause);
                        }
                    }
                    debug!(calls, "Writer finished");
                    Ok(calls)
                })
                .map_err(anyhow::Error::from)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut total = 0_u64;
    for handle in handles {
        let calls = handle
            .join()
            .map_err(|_panic| anyhow!("writer thread panicked"))??;
        total = total.saturating_add(calls);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfslice_pipeline::MemorySink;
    use perfslice_scheduler::ManualClock;

    #[test]
    fn test_sample_cost_stays_near_typical() {
        let mut rng = rand::rng();
        for _ in 0..1_000 {
            let cost = sample_cost(&mut rng, 10);
            assert!((5..=800).contains(&cost), "cost {cost} out of range");
        }
    }

    #[test]
    fn test_run_records_every_call() -> Result<()> {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let sink = Arc::new(MemorySink::new());
        let config = AgentConfig::builder().slice_ms(1_000).build()?;
        let agent = Arc::new(
            PerfAgent::builder(config.clone())
                .apis(demo_apis(&config))
                .clock(clock.clone())
                .sink(sink.clone())
                .build()?,
        );

        let recorded = run(
            &agent,
            Workload {
                threads: 2,
                duration: Duration::from_millis(50),
                pause: Duration::ZERO,
            },
        )?;

        clock.set(1_700_000_001_000);
        agent.rotate_now();
        agent.pump_now();

        let delivered: u64 = sink.batches().iter().map(|batch| batch.total_count()).sum();
        assert!(recorded > 0);
        assert_eq!(delivered, recorded);
        Ok(())
    }
}
