//! Change-detected metadata store and its flush task.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use http::{HeaderMap, HeaderValue, header};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tally_core::{
    HOST_TAG, HttpSink, NameRole, SinkError, TagSet, check_clean, check_series, check_tags,
    os_hostname,
};

use crate::error::MetadataError;
use crate::types::{MetaKey, MetaSend, MetaValue, RateType, Unit};

/// Metadata ingestion path on the sink.
pub const META_PUT_PATH: &str = "/api/metadata/put";

#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Sink `host[:port]`.
    pub host: String,
    /// Overrides the OS host name for the injected host tag.
    pub host_tag: Option<String>,
    /// Log every `add_meta` call, not only changes.
    pub debug: bool,
    /// Delay before the first flush.
    pub warmup: Duration,
    pub flush_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            host_tag: None,
            debug: false,
            warmup: Duration::from_secs(5),
            flush_interval: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl MetadataConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_host_tag(mut self, host_tag: impl Into<String>) -> Self {
        self.host_tag = Some(host_tag.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Outcome of one `add_meta` call.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaUpdate {
    /// No entry existed for the key.
    Added,
    /// The stored value was equal to the new one.
    Unchanged,
    /// The stored value differed and was replaced.
    Changed { previous: MetaValue },
}

type Producer = Arc<dyn Fn() + Send + Sync>;

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    config: MetadataConfig,
    sink: HttpSink,
    host: String,
    entries: Mutex<BTreeMap<MetaKey, MetaValue>>,
    producers: Mutex<Vec<Producer>>,
    running: Mutex<Option<Running>>,
}

/// Keeps the latest value per metadata key and periodically posts the
/// full set to the sink.
#[derive(Clone)]
pub struct MetadataTracker {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`MetadataTracker`].
#[derive(Clone)]
pub struct WeakMetadataTracker {
    inner: Weak<Inner>,
}

impl WeakMetadataTracker {
    /// `None` once every `MetadataTracker` handle has been dropped.
    pub fn upgrade(&self) -> Option<MetadataTracker> {
        self.inner.upgrade().map(|inner| MetadataTracker { inner })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MetadataTracker {
    pub fn new(config: MetadataConfig) -> Result<Self, MetadataError> {
        if config.host.is_empty() {
            return Err(MetadataError::EmptyHost);
        }
        let host = match &config.host_tag {
            Some(tag) => {
                check_clean(tag, NameRole::HostTag)?;
                tag.clone()
            }
            None => os_hostname()?,
        };
        let sink = HttpSink::new(&config.host, config.request_timeout);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sink,
                host,
                entries: Mutex::new(BTreeMap::new()),
                producers: Mutex::new(Vec::new()),
                running: Mutex::new(None),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakMetadataTracker {
        WeakMetadataTracker {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn host_tag(&self) -> &str {
        &self.inner.host
    }

    /// Store `value` under `(metric, tags, name)`, replacing any earlier
    /// value.
    ///
    /// With `set_host`, the host tag is added when `tags` lacks one. An
    /// empty `metric` attaches the entry to the tag set alone.
    pub fn add_meta(
        &self,
        metric: &str,
        mut tags: TagSet,
        name: &str,
        value: impl Into<MetaValue>,
        set_host: bool,
    ) -> Result<MetaUpdate, MetadataError> {
        if metric.is_empty() {
            check_tags(&tags)?;
        } else {
            check_series(metric, &tags)?;
        }
        if set_host {
            tags.set_default(HOST_TAG, &self.inner.host);
        }
        let value = value.into();
        let key = MetaKey {
            metric: metric.to_string(),
            tags,
            name: name.to_string(),
        };

        let mut entries = lock(&self.inner.entries);
        let update = match entries.get(&key) {
            None => MetaUpdate::Added,
            Some(prev) if *prev == value => MetaUpdate::Unchanged,
            Some(prev) => MetaUpdate::Changed {
                previous: prev.clone(),
            },
        };
        match &update {
            MetaUpdate::Changed { previous } => {
                info!(key = %key, from = %previous, to = %value, "metadata changed");
            }
            _ if self.inner.config.debug => {
                info!(key = %key, value = %value, "add meta");
            }
            _ => {}
        }
        entries.insert(key, value);
        Ok(update)
    }

    /// Record the rate type, unit and, when non-empty, the description of
    /// `metric`.
    pub fn add_metric_meta(
        &self,
        metric: &str,
        rate: RateType,
        unit: Unit,
        desc: &str,
    ) -> Result<(), MetadataError> {
        self.add_meta(metric, TagSet::new(), "rate", rate, false)?;
        self.add_meta(metric, TagSet::new(), "unit", unit, false)?;
        if !desc.is_empty() {
            self.add_meta(metric, TagSet::new(), "desc", desc, false)?;
        }
        Ok(())
    }

    /// Register a callback run before every flush, typically to refresh
    /// entries through `add_meta`. A producer that writes back into this
    /// tracker should hold a [`WeakMetadataTracker`], not a clone.
    pub fn register_producer<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.inner.producers).push(Arc::new(f));
    }

    pub fn get(&self, metric: &str, tags: &TagSet, name: &str) -> Option<MetaValue> {
        let key = MetaKey {
            metric: metric.to_string(),
            tags: tags.clone(),
            name: name.to_string(),
        };
        lock(&self.inner.entries).get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.entries).is_empty()
    }

    /// Indented JSON array of every entry in key order, or `None` when
    /// there is nothing to send.
    pub fn encode(&self) -> Result<Option<Vec<u8>>, SinkError> {
        let entries = lock(&self.inner.entries);
        if entries.is_empty() {
            return Ok(None);
        }
        let records: Vec<MetaSend<'_>> = entries.iter().map(|(k, v)| MetaSend::new(k, v)).collect();
        serde_json::to_vec_pretty(&records)
            .map(Some)
            .map_err(|e| SinkError::Encode(e.to_string()))
    }

    /// Run the producers, then post the whole store. Returns the number of
    /// entries sent; an empty store sends nothing.
    pub async fn flush(&self) -> Result<usize, SinkError> {
        let producers: Vec<Producer> = lock(&self.inner.producers).clone();
        for produce in &producers {
            produce();
        }

        let count = self.len();
        let Some(body) = self.encode()? else {
            debug!("no metadata to send");
            return Ok(0);
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.inner.sink.post(META_PUT_PATH, headers, body).await?;
        debug!(entries = count, "metadata sent");
        Ok(count)
    }

    /// Spawn the flush task on the current tokio runtime.
    pub fn start(&self) -> Result<(), MetadataError> {
        let mut running = lock(&self.inner.running);
        if running.is_some() {
            return Err(MetadataError::AlreadyStarted);
        }
        let runtime = Handle::try_current().map_err(|_| MetadataError::NoRuntime)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = &self.inner.config;
        let handle = runtime.spawn(run_flush(
            self.downgrade(),
            config.warmup,
            config.flush_interval,
            shutdown_rx,
        ));
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        info!(
            sink = %self.inner.sink.url(META_PUT_PATH),
            flush_secs = self.inner.config.flush_interval.as_secs(),
            "metadata tracker started"
        );
        Ok(())
    }

    /// Stop the flush task. A flush in progress runs to completion.
    pub async fn shutdown(&self) {
        let running = lock(&self.inner.running).take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown_tx.send(true);
        let _ = running.handle.await;
        debug!("metadata tracker stopped");
    }
}

/// Flush loop. Holds the tracker weakly; once every handle is dropped
/// the shutdown sender goes with it and the loop ends.
async fn run_flush(
    tracker: WeakMetadataTracker,
    warmup: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(warmup) => {}
        _ = shutdown.changed() => return,
    }
    loop {
        let Some(strong) = tracker.upgrade() else {
            break;
        };
        if let Err(e) = strong.flush().await {
            error!(error = %e, "metadata flush failed");
        }
        drop(strong);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("metadata flush task stopped");
}
