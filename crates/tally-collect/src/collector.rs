//! The collector instance and its lifecycle.
//!
//! A [`Collector`] owns its registry, buffer, channel and counters, so
//! several can coexist in one process. Nothing runs until [`init`] is
//! called; [`shutdown`] stops and joins every background task.
//!
//! [`init`]: Collector::init
//! [`shutdown`]: Collector::shutdown

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tally_core::{
    DataPoint, HOST_TAG, NameRole, TagSet, check_clean, check_series, epoch_secs, os_hostname,
};

use crate::config::CollectConfig;
use crate::error::CollectError;
use crate::queue::{IngestBuffer, run_ingest};
use crate::registry::Registry;
use crate::selfstats::{Counters, resident_bytes};
use crate::sender::BatchSender;

/// Point-in-time delivery figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub sent: u64,
    pub dropped: u64,
    pub queued: usize,
}

/// State fixed by a successful `init`.
struct Started {
    host: String,
    /// Prefix plus trailing `.`.
    metric_root: String,
    sender: mpsc::Sender<DataPoint>,
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

struct Shared {
    config: CollectConfig,
    registry: Arc<Registry>,
    buffer: Arc<IngestBuffer>,
    counters: Arc<Counters>,
    started: OnceLock<Started>,
    running: Mutex<Option<Running>>,
}

/// Aggregates counters and gauges and ships them to an OpenTSDB sink.
///
/// Cheap to clone; clones share the same pipeline.
#[derive(Clone)]
pub struct Collector {
    shared: Arc<Shared>,
}

impl Collector {
    /// Create an unstarted collector.
    pub fn new(config: CollectConfig) -> Self {
        let buffer = Arc::new(IngestBuffer::new(config.max_queue_len));
        Self {
            shared: Arc::new(Shared {
                config,
                registry: Arc::new(Registry::new()),
                buffer,
                counters: Arc::new(Counters::default()),
                started: OnceLock::new(),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &CollectConfig {
        &self.shared.config
    }

    /// Validate the configuration, resolve the host tag and spawn the
    /// ingest, snapshot and sender tasks on the current tokio runtime.
    ///
    /// Registers the `collect.dropped`, `collect.sent`, `collect.alloc`
    /// and `collect.tasks` self gauges.
    pub fn init(&self) -> Result<(), CollectError> {
        let shared = &self.shared;
        if shared.started.get().is_some() {
            return Err(CollectError::AlreadyInitialized);
        }
        let config = &shared.config;

        let host = match &config.host_tag {
            Some(tag) => {
                check_clean(tag, NameRole::HostTag)?;
                tag.clone()
            }
            None => os_hostname()?,
        };
        check_clean(&config.prefix, NameRole::MetricRoot)?;
        if config.host.is_empty() {
            return Err(CollectError::EmptyHost);
        }
        let runtime = Handle::try_current().map_err(|_| CollectError::NoRuntime)?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let metric_root = format!("{}.", config.prefix);
        let started = Started {
            host,
            metric_root: metric_root.clone(),
            sender: tx.clone(),
        };
        if shared.started.set(started).is_err() {
            return Err(CollectError::AlreadyInitialized);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingest = runtime.spawn(run_ingest(
            rx,
            shared.buffer.clone(),
            shared.counters.clone(),
            config.debug,
            shutdown_rx.clone(),
        ));
        let sender = BatchSender::new(
            config,
            shared.buffer.clone(),
            tx.clone(),
            shared.counters.clone(),
        );
        let send = runtime.spawn(sender.run(shutdown_rx.clone()));
        let snapshot = runtime.spawn(run_snapshots(
            shared.registry.clone(),
            metric_root,
            config.interval,
            tx,
            shutdown_rx,
        ));
        *shared.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(Running {
            shutdown_tx,
            handles: vec![ingest, send, snapshot],
        });

        self.register_self_gauges(runtime)?;
        info!(
            host = %config.host,
            prefix = %config.prefix,
            interval_secs = config.interval.as_secs(),
            "collector initialized"
        );
        Ok(())
    }

    fn register_self_gauges(&self, runtime: Handle) -> Result<(), CollectError> {
        let counters = self.shared.counters.clone();
        self.set("collect.dropped", TagSet::new(), move || {
            counters.dropped() as i64
        })?;
        let counters = self.shared.counters.clone();
        self.set("collect.sent", TagSet::new(), move || counters.sent() as i64)?;
        self.set("collect.alloc", TagSet::new(), resident_bytes)?;
        self.set("collect.tasks", TagSet::new(), move || {
            runtime.metrics().num_alive_tasks() as i64
        })?;
        Ok(())
    }

    fn started(&self) -> Result<&Started, CollectError> {
        self.shared.started.get().ok_or(CollectError::NotInitialized)
    }

    /// Validate a series and inject the default host tag.
    fn check(&self, metric: &str, mut tags: TagSet) -> Result<TagSet, CollectError> {
        let started = self.started()?;
        check_series(metric, &tags)?;
        tags.set_default(HOST_TAG, &started.host);
        Ok(tags)
    }

    /// Add `delta` to the counter identified by `metric` and `tags`.
    pub fn add(&self, metric: &str, delta: i64, tags: TagSet) -> Result<(), CollectError> {
        let tags = self.check(metric, tags)?;
        self.shared.registry.add(metric, delta, tags);
        Ok(())
    }

    /// Register a gauge whose value is computed by `f` at every snapshot.
    ///
    /// Replaces any earlier callback for the same series. `f` runs on
    /// the snapshot task and should return quickly.
    pub fn set<F>(&self, metric: &str, tags: TagSet, f: F) -> Result<(), CollectError>
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        let tags = self.check(metric, tags)?;
        self.shared.registry.set(metric, tags, Arc::new(f));
        Ok(())
    }

    /// Submit a ready-made data point. The metric name is used as given,
    /// without the prefix.
    pub async fn put(&self, mut dp: DataPoint) -> Result<(), CollectError> {
        dp.tags = self.check(&dp.metric, std::mem::take(&mut dp.tags))?;
        self.started()?
            .sender
            .send(dp)
            .await
            .map_err(|_| CollectError::Closed)
    }

    /// Raw ingestion channel. Points sent here are not validated.
    pub fn sender(&self) -> Result<mpsc::Sender<DataPoint>, CollectError> {
        Ok(self.started()?.sender.clone())
    }

    /// Host tag injected into series without one.
    pub fn host_tag(&self) -> Option<&str> {
        self.shared.started.get().map(|s| s.host.as_str())
    }

    /// Evaluate the registry now without enqueuing anything.
    pub fn snapshot(&self) -> Result<Vec<DataPoint>, CollectError> {
        let started = self.started()?;
        Ok(self
            .shared
            .registry
            .snapshot(&started.metric_root, epoch_secs()))
    }

    pub fn stats(&self) -> CollectStats {
        CollectStats {
            sent: self.shared.counters.sent(),
            dropped: self.shared.counters.dropped(),
            queued: self.shared.buffer.len(),
        }
    }

    /// Stop the background tasks and wait for them to finish. An
    /// in-flight POST is allowed to complete.
    pub async fn shutdown(&self) {
        let running = self
            .shared
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown_tx.send(true);
        for handle in running.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "collector task failed");
            }
        }
        info!(
            sent = self.shared.counters.sent(),
            dropped = self.shared.counters.dropped(),
            queued = self.shared.buffer.len(),
            "collector stopped"
        );
    }
}

/// Snapshot loop: emit, then sleep `interval`.
async fn run_snapshots(
    registry: Arc<Registry>,
    metric_root: String,
    interval: std::time::Duration,
    tx: mpsc::Sender<DataPoint>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let points = registry.snapshot(&metric_root, epoch_secs());
        debug!(points = points.len(), "snapshot taken");
        for dp in points {
            if tx.send(dp).await.is_err() {
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("snapshot task stopped");
}
