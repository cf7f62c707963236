//! tally.toml configuration file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use tally_collect::CollectConfig;
use tally_metadata::MetadataConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentFile {
    pub sink: SinkSection,
    pub collect: CollectSection,
    pub metadata: MetadataSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkSection {
    /// OpenTSDB `host[:port]`.
    pub host: String,
    pub prefix: String,
    /// Replaces the OS host name in the `host` tag.
    pub host_tag: Option<String>,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            prefix: "tally".to_string(),
            host_tag: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectSection {
    pub interval: Option<String>,
    pub max_queue_len: Option<usize>,
    pub batch_size: Option<usize>,
    pub debug: bool,
    pub print: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataSection {
    /// Defaults to the sink host.
    pub host: Option<String>,
    pub flush_interval: Option<String>,
    pub debug: bool,
}

impl AgentFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: AgentFile =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(file)
    }

    pub fn collect_config(&self) -> anyhow::Result<CollectConfig> {
        let mut config = CollectConfig::new(&self.sink.host, &self.sink.prefix)
            .with_debug(self.collect.debug)
            .with_print(self.collect.print);
        if let Some(tag) = &self.sink.host_tag {
            config = config.with_host_tag(tag);
        }
        if let Some(interval) = &self.collect.interval {
            config = config.with_interval(duration_field("collect.interval", interval)?);
        }
        if let Some(n) = self.collect.max_queue_len {
            config = config.with_max_queue_len(n);
        }
        if let Some(n) = self.collect.batch_size {
            config = config.with_batch_size(n);
        }
        Ok(config)
    }

    pub fn metadata_config(&self) -> anyhow::Result<MetadataConfig> {
        let host = self.metadata.host.as_deref().unwrap_or(&self.sink.host);
        let mut config = MetadataConfig::new(host).with_debug(self.metadata.debug);
        if let Some(tag) = &self.sink.host_tag {
            config = config.with_host_tag(tag);
        }
        if let Some(interval) = &self.metadata.flush_interval {
            config =
                config.with_flush_interval(duration_field("metadata.flush_interval", interval)?);
        }
        Ok(config)
    }
}

fn duration_field(field: &str, value: &str) -> anyhow::Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => bail!("{field}: invalid duration {value:?}"),
    }
}

/// Parse "500ms", "15s", "2m", "1h" or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours = hours.parse::<u64>().ok()?;
        hours.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
