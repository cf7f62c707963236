//! Bounded ingestion buffer and the task feeding it.
//!
//! The length check and the append happen under one lock, so the buffer
//! never holds more than `max_len` points. Overflow drops the incoming
//! point rather than blocking the producer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use tally_core::DataPoint;

use crate::selfstats::Counters;

/// FIFO of data points waiting to be sent.
pub struct IngestBuffer {
    points: Mutex<VecDeque<DataPoint>>,
    max_len: usize,
}

impl IngestBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            points: Mutex::new(VecDeque::new()),
            max_len,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DataPoint>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `dp` unless the buffer is full. Returns whether it was kept.
    pub fn try_push(&self, dp: DataPoint) -> bool {
        let mut points = self.lock();
        if points.len() >= self.max_len {
            return false;
        }
        points.push_back(dp);
        true
    }

    /// Remove up to `n` points from the head.
    pub fn pop_batch(&self, n: usize) -> Vec<DataPoint> {
        let mut points = self.lock();
        let take = n.min(points.len());
        points.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

/// Move points from the ingestion channel into the buffer until the
/// channel closes or shutdown is signalled.
pub(crate) async fn run_ingest(
    mut rx: mpsc::Receiver<DataPoint>,
    buffer: Arc<IngestBuffer>,
    counters: Arc<Counters>,
    debug_log: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(max_len = buffer.max_len(), "ingest task started");
    loop {
        tokio::select! {
            dp = rx.recv() => {
                let Some(dp) = dp else {
                    break;
                };
                if !buffer.try_push(dp) {
                    counters.record_dropped();
                    if debug_log {
                        info!(dropped = counters.dropped(), "ingest buffer full, data point dropped");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("ingest task stopped");
}
