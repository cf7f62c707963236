//! Registry of counters and gauges.
//!
//! Both maps live behind a single mutex. Entries are keyed by the metric
//! name followed by the canonical tag string, e.g. `os.cpu{host=web01}`,
//! and live for the lifetime of the registry.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use tally_core::{DataPoint, TagSet};

/// Callback producing a gauge value, invoked once per snapshot.
///
/// Gauges are evaluated after the registry lock is released, so a gauge
/// may read other state freely, but it runs on the snapshot task and
/// should return quickly. A gauge that panics is left out of that
/// snapshot and evaluated again at the next one.
pub type GaugeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

struct CounterEntry {
    metric: String,
    tags: TagSet,
    value: i64,
}

struct GaugeEntry {
    metric: String,
    tags: TagSet,
    f: GaugeFn,
}

#[derive(Default)]
struct Entries {
    counters: HashMap<String, CounterEntry>,
    gauges: HashMap<String, GaugeEntry>,
}

/// In-memory map of series. Inputs are assumed validated.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<Entries>,
}

fn series_key(metric: &str, tags: &TagSet) -> String {
    format!("{metric}{tags}")
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `delta` to the counter for this series, creating it at zero.
    pub fn add(&self, metric: &str, delta: i64, tags: TagSet) {
        let key = series_key(metric, &tags);
        let mut entries = self.lock();
        let entry = entries.counters.entry(key).or_insert_with(|| CounterEntry {
            metric: metric.to_string(),
            tags,
            value: 0,
        });
        entry.value = entry.value.wrapping_add(delta);
    }

    /// Register or replace the gauge callback for this series.
    pub fn set(&self, metric: &str, tags: TagSet, f: GaugeFn) {
        let key = series_key(metric, &tags);
        self.lock().gauges.insert(
            key,
            GaugeEntry {
                metric: metric.to_string(),
                tags,
                f,
            },
        );
    }

    /// Current value of a counter, if registered.
    pub fn counter(&self, metric: &str, tags: &TagSet) -> Option<i64> {
        self.lock()
            .counters
            .get(&series_key(metric, tags))
            .map(|c| c.value)
    }

    /// Number of registered series.
    pub fn len(&self) -> usize {
        let entries = self.lock();
        entries.counters.len() + entries.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One data point per counter and gauge, stamped with `timestamp`.
    ///
    /// Counters and gauge callbacks are copied under the lock; the
    /// callbacks themselves run after it is released. A panicking
    /// callback is logged and skipped.
    pub fn snapshot(&self, metric_root: &str, timestamp: i64) -> Vec<DataPoint> {
        let (mut points, gauges) = {
            let entries = self.lock();
            let points: Vec<DataPoint> = entries
                .counters
                .values()
                .map(|c| {
                    DataPoint::new(
                        format!("{metric_root}{}", c.metric),
                        timestamp,
                        c.value,
                        c.tags.clone(),
                    )
                })
                .collect();
            let gauges: Vec<(String, TagSet, GaugeFn)> = entries
                .gauges
                .values()
                .map(|g| (g.metric.clone(), g.tags.clone(), g.f.clone()))
                .collect();
            (points, gauges)
        };

        points.reserve(gauges.len());
        for (metric, tags, f) in gauges {
            match panic::catch_unwind(AssertUnwindSafe(|| f())) {
                Ok(value) => points.push(DataPoint::new(
                    format!("{metric_root}{metric}"),
                    timestamp,
                    value,
                    tags,
                )),
                Err(_) => error!(metric = %metric, tags = %tags, "gauge callback panicked"),
            }
        }
        points
    }
}
