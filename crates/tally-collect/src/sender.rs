//! Batch sender.
//!
//! Drains the buffer head in `batch_size` chunks, gzips each chunk as a
//! JSON array and POSTs it to `/api/put`. A failed batch is split by age:
//! points older than `max_retry_age` are discarded, the rest go back
//! through the ingestion channel. The sender then waits `retry_wait`
//! before the next attempt. There is no retry limit.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::{HeaderMap, HeaderValue, header};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use tally_core::{DataPoint, HttpSink, SinkError, epoch_secs};

use crate::config::CollectConfig;
use crate::queue::IngestBuffer;
use crate::selfstats::Counters;

/// Ingestion path on the sink.
pub const PUT_PATH: &str = "/api/put";

/// Serialize `batch` as a JSON array and gzip it.
pub fn encode_batch(batch: &[DataPoint]) -> Result<Vec<u8>, SinkError> {
    let json = serde_json::to_vec(batch).map_err(|e| SinkError::Encode(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| SinkError::Encode(e.to_string()))?;
    encoder.finish().map_err(|e| SinkError::Encode(e.to_string()))
}

/// Split a failed batch into points to retry and the count of points
/// stamped before `cutoff`.
pub fn partition_stale(batch: Vec<DataPoint>, cutoff: i64) -> (Vec<DataPoint>, usize) {
    let total = batch.len();
    let fresh: Vec<DataPoint> = batch
        .into_iter()
        .filter(|dp| dp.timestamp >= cutoff)
        .collect();
    let old = total - fresh.len();
    (fresh, old)
}

pub(crate) struct BatchSender {
    buffer: Arc<IngestBuffer>,
    requeue: mpsc::Sender<DataPoint>,
    counters: Arc<Counters>,
    sink: HttpSink,
    batch_size: usize,
    idle_wait: Duration,
    retry_wait: Duration,
    max_retry_age: Duration,
    debug: bool,
    print: bool,
}

impl BatchSender {
    pub(crate) fn new(
        config: &CollectConfig,
        buffer: Arc<IngestBuffer>,
        requeue: mpsc::Sender<DataPoint>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            buffer,
            requeue,
            counters,
            sink: HttpSink::new(&config.host, config.request_timeout),
            batch_size: config.batch_size,
            idle_wait: config.idle_wait,
            retry_wait: config.retry_wait,
            max_retry_age: config.max_retry_age,
            debug: config.debug,
            print: config.print,
        }
    }

    /// Run until shutdown is signalled.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sink = %self.sink.url(PUT_PATH),
            batch_size = self.batch_size,
            print = self.print,
            "batch sender started"
        );

        loop {
            let batch = self.buffer.pop_batch(self.batch_size);
            let wait = if batch.is_empty() {
                Some(self.idle_wait)
            } else {
                if self.debug {
                    info!(
                        sending = batch.len(),
                        remaining = self.buffer.len(),
                        "sending batch"
                    );
                }
                self.deliver(batch).await
            };

            match wait {
                Some(wait) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                None => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("batch sender stopped");
    }

    /// Send one batch. Returns the backoff to apply, if any.
    async fn deliver(&self, batch: Vec<DataPoint>) -> Option<Duration> {
        match self.send_batch(&batch).await {
            Ok(()) => {
                self.record_sent(batch.len());
                None
            }
            Err(e) => {
                error!(error = %e, points = batch.len(), "failed to send batch");
                self.requeue_fresh(batch).await;
                Some(self.retry_wait)
            }
        }
    }

    async fn send_batch(&self, batch: &[DataPoint]) -> Result<(), SinkError> {
        if self.print {
            for dp in batch {
                info!("{}", dp.telnet());
            }
            return Ok(());
        }

        let body = encode_batch(batch)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        self.sink.post(PUT_PATH, headers, body).await
    }

    /// Put the not-yet-stale part of a failed batch back into the
    /// ingestion channel. Returns the number of points restored.
    async fn requeue_fresh(&self, batch: Vec<DataPoint>) -> usize {
        let cutoff = epoch_secs() - self.max_retry_age.as_secs() as i64;
        let (fresh, old) = partition_stale(batch, cutoff);
        if old > 0 {
            info!(old, "removed old records");
        }

        let mut restored = 0;
        for dp in fresh {
            if self.requeue.send(dp).await.is_err() {
                break;
            }
            restored += 1;
        }
        info!(
            restored,
            wait_ms = self.retry_wait.as_millis() as u64,
            "restored records, backing off"
        );
        restored
    }

    fn record_sent(&self, n: usize) {
        if self.debug {
            info!(sent = n, "batch sent");
        }
        self.counters.record_sent(n);
    }
}
