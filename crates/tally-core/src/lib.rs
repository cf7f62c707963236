//! tally-core — shared building blocks for the tally telemetry agent.
//!
//! Defines how a time series is identified (metric name + [`TagSet`]),
//! the character policy every name must pass, the [`DataPoint`] moved
//! through the delivery pipeline, and a minimal HTTP client used to POST
//! payloads to an OpenTSDB-compatible ingestion endpoint.
//!
//! # Architecture
//!
//! ```text
//! clean        ← check_clean() / clean(): allowed-character policy
//! tags         ← TagSet: sorted key→value map, canonical "{k=v,...}" form
//! datapoint    ← DataPoint { metric, timestamp, value, tags }
//! host         ← short, lower-cased local host name for the "host" tag
//! sink         ← HttpSink::post(): one request per connection, 204 = success
//! ```

pub mod clean;
pub mod datapoint;
pub mod error;
pub mod host;
pub mod sink;
pub mod tags;

pub use clean::{check_clean, check_series, check_tags, clean};
pub use datapoint::{DataPoint, MetricValue};
pub use error::{HostError, NameRole, SinkError, ValidationError};
pub use host::{os_hostname, short_hostname};
pub use sink::{DEFAULT_PORT, HttpSink, with_default_port};
pub use tags::{HOST_TAG, TagSet};

/// Current wall-clock time in unix seconds.
pub fn epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
