//! tallyd — the tally telemetry agent.
//!
//! Runs a collector and a metadata tracker against one OpenTSDB sink,
//! reporting its own uptime and delivery figures, until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! tallyd --config /etc/tally.toml
//! tallyd --host tsdb.example.com --prefix web --print
//! ```

mod config;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use tally_collect::Collector;
use tally_core::TagSet;
use tally_metadata::{MetadataTracker, RateType, Unit};

use crate::config::AgentFile;

const DEFAULT_FILTER: &str = "info,tally=debug,tallyd=debug";

#[derive(Parser)]
#[command(name = "tallyd", about = "Tally telemetry agent")]
struct Cli {
    /// Path to a tally.toml file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// OpenTSDB host, optionally with a port (default 4242).
    #[arg(long)]
    host: Option<String>,

    /// Prefix prepended to every metric name.
    #[arg(long)]
    prefix: Option<String>,

    /// Log every batch and every metadata update.
    #[arg(long)]
    debug: bool,

    /// Log data points instead of sending them.
    #[arg(long)]
    print: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let mut agent = match &cli.config {
        Some(path) => AgentFile::from_file(path)?,
        None => AgentFile::default(),
    };
    if let Some(host) = cli.host {
        agent.sink.host = host;
    }
    if let Some(prefix) = cli.prefix {
        agent.sink.prefix = prefix;
    }
    if cli.debug {
        agent.collect.debug = true;
        agent.metadata.debug = true;
    }
    if cli.print {
        agent.collect.print = true;
    }

    run(agent).await
}

async fn run(agent: AgentFile) -> anyhow::Result<()> {
    let collector = Collector::new(agent.collect_config()?);
    collector.init().context("starting collector")?;

    let started = Instant::now();
    collector.set("agent.uptime", TagSet::new(), move || {
        started.elapsed().as_secs() as i64
    })?;

    let tracker = MetadataTracker::new(agent.metadata_config()?)?;
    describe_metrics(&tracker, &agent.sink.prefix)?;
    tracker.register_producer({
        let tracker = tracker.downgrade();
        move || {
            if let Some(tracker) = tracker.upgrade() {
                record_version(&tracker);
            }
        }
    });
    if !agent.collect.print {
        tracker.start()?;
    }

    info!(
        host = %agent.sink.host,
        prefix = %agent.sink.prefix,
        "tally agent running"
    );
    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");

    tracker.shutdown().await;
    collector.shutdown().await;

    let stats = collector.stats();
    info!(
        sent = stats.sent,
        dropped = stats.dropped,
        queued = stats.queued,
        "tally agent stopped"
    );
    Ok(())
}

fn describe_metrics(tracker: &MetadataTracker, prefix: &str) -> anyhow::Result<()> {
    let described = [
        ("agent.uptime", RateType::Gauge, Unit::Second, "Seconds since the agent started."),
        ("collect.sent", RateType::Counter, Unit::None, "Data points accepted by the sink."),
        ("collect.dropped", RateType::Counter, Unit::None, "Data points dropped on a full buffer."),
        ("collect.alloc", RateType::Gauge, Unit::Bytes, "Resident memory of the agent process."),
        ("collect.tasks", RateType::Gauge, Unit::None, "Live tokio tasks in the agent."),
    ];
    for (metric, rate, unit, desc) in described {
        tracker.add_metric_meta(&format!("{prefix}.{metric}"), rate, unit, desc)?;
    }
    Ok(())
}

fn record_version(tracker: &MetadataTracker) {
    if let Err(e) = tracker.add_meta(
        "",
        TagSet::new(),
        "agent.version",
        env!("CARGO_PKG_VERSION"),
        true,
    ) {
        warn!(error = %e, "failed to record agent version");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_metadata::{MetaValue, MetadataConfig};

    fn tracker() -> MetadataTracker {
        MetadataTracker::new(MetadataConfig::new("127.0.0.1:1").with_host_tag("web01")).unwrap()
    }

    #[test]
    fn version_recorded_on_host_tags() {
        let tracker = tracker();
        record_version(&tracker);
        record_version(&tracker);

        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get("", &TagSet::new().with("host", "web01"), "agent.version"),
            Some(MetaValue::Str(env!("CARGO_PKG_VERSION").to_string()))
        );
    }

    #[test]
    fn described_metrics_carry_prefix() {
        let tracker = tracker();
        describe_metrics(&tracker, "web").unwrap();
        assert_eq!(
            tracker.get("web.collect.sent", &TagSet::new(), "rate"),
            Some(MetaValue::from(RateType::Counter))
        );
        assert!(tracker.get("collect.sent", &TagSet::new(), "rate").is_none());
    }
}
