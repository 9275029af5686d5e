//! perfsliced - time-sliced latency agent demo
//!
//! Registers a few demo APIs, drives them with synthetic traffic and lets the
//! agent rotate and aggregate them slice by slice. Every finished slice is
//! logged as one JSON batch under the `perfslice::stats` target.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod logging;
mod workload;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use perfslice_pipeline::{AgentConfig, AsyncSink, LogSink, PerfAgent};
use tracing::info;

use crate::logging::{LoggingConfig, init_logging};
use crate::workload::Workload;

/// Slice size used when neither a flag nor a config file sets one.
const DEMO_SLICE_MS: u64 = 5_000;

#[derive(Parser, Debug)]
#[command(name = "perfsliced")]
#[command(about = "Time-sliced API latency agent driven by a synthetic workload")]
#[command(version)]
struct Cli {
    /// Agent configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the slice size in milliseconds
    #[arg(long)]
    slice_ms: Option<u64>,

    /// How long to run the workload
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Writer threads
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Pause between calls of one writer, in microseconds
    #[arg(long, default_value_t = 200)]
    pause_us: u64,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Resolve the agent configuration: flag, then file, then demo default.
    fn agent_config(&self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => AgentConfig {
                slice_ms: DEMO_SLICE_MS,
                ..AgentConfig::default()
            },
        };
        if let Some(slice_ms) = self.slice_ms {
            config.slice_ms = slice_ms;
        }
        config.validate().context("invalid agent configuration")?;
        Ok(config)
    }

    fn workload(&self) -> Workload {
        Workload {
            threads: self.threads,
            duration: Duration::from_secs(self.duration_secs),
            pause: Duration::from_micros(self.pause_us),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingConfig::from_verbosity(cli.verbose, cli.json))?;

    let config = cli.agent_config()?;
    let sink = Arc::new(AsyncSink::new(
        Arc::new(LogSink::new().skip_idle()),
        config.sink_queue_capacity,
    )?);
    let agent = Arc::new(
        PerfAgent::builder(config.clone())
            .apis(workload::demo_apis(&config))
            .sink(sink.clone())
            .build()?,
    );

    info!(
        slice_ms = config.effective_slice_ms(),
        mode = ?config.recorder_mode,
        apis = agent.registry().len(),
        "Starting perfslice agent"
    );
    agent.start()?;

    let recorded = workload::run(&agent, cli.workload())?;
    agent.stop()?;

    let summary = serde_json::json!({
        "recorded": recorded,
        "pipeline": agent.metrics(),
        "scheduler": {
            "polls": agent.scheduler_stats().polls,
            "fires": agent.scheduler_stats().fires,
            "task_failures": agent.scheduler_stats().task_failures,
        },
        "sink": {
            "delivered": sink.delivered(),
            "dropped": sink.dropped(),
            "failed": sink.failed(),
        },
    });
    info!(summary = %summary, "Agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["perfsliced"])?;
        assert!(cli.config.is_none());
        assert!(cli.slice_ms.is_none());
        assert_eq!(cli.duration_secs, 10);
        assert_eq!(cli.threads, 4);
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        Ok(())
    }

    #[test]
    fn parse_verbose_levels() -> TestResult {
        let cli = Cli::try_parse_from(["perfsliced", "-vv", "--json"])?;
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        Ok(())
    }

    #[test]
    fn parse_rejects_non_numeric_slice() {
        let result = Cli::try_parse_from(["perfsliced", "--slice-ms", "fast"]);
        assert!(matches!(result, Err(_)));
    }

    #[test]
    fn demo_default_slice_without_config() -> TestResult {
        let cli = Cli::try_parse_from(["perfsliced"])?;
        let config = cli.agent_config()?;
        assert_eq!(config.slice_ms, DEMO_SLICE_MS);
        Ok(())
    }

    #[test]
    fn slice_flag_overrides_config_file() -> TestResult {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        writeln!(file, "slice_ms: 2000\nrecorder_mode: accurate")?;
        let path = file.path().to_string_lossy().into_owned();

        let from_file = Cli::try_parse_from(["perfsliced", "--config", path.as_str()])?;
        assert_eq!(from_file.agent_config()?.slice_ms, 2_000);

        let overridden =
            Cli::try_parse_from(["perfsliced", "--config", path.as_str(), "--slice-ms", "3000"])?;
        assert_eq!(overridden.agent_config()?.slice_ms, 3_000);
        Ok(())
    }

    #[test]
    fn workload_follows_flags() -> TestResult {
        let cli = Cli::try_parse_from(["perfsliced", "--threads", "2", "--duration-secs", "1"])?;
        let workload = cli.workload();
        assert_eq!(workload.threads, 2);
        assert_eq!(workload.duration, Duration::from_secs(1));
        Ok(())
    }
}
