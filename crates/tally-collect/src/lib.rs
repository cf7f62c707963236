//! tally-collect — in-process aggregation and delivery of time series.
//!
//! Application code registers counters and computed gauges; the
//! collector snapshots them on a fixed interval, buffers the resulting
//! data points under a hard length bound and ships them in gzip'd JSON
//! batches to an OpenTSDB `/api/put` endpoint.
//!
//! # Architecture
//!
//! ```text
//! Collector
//!   ├── add() / set()        ← callers, validated, host tag injected
//!   ├── Registry             ← one lock around counters + gauges
//!   ├── snapshot task        → one DataPoint per entry every `interval`
//!   ├── ingestion channel    ← snapshot task, requeues, external put()
//!   ├── ingest task          → IngestBuffer (drops newest when full)
//!   └── sender task          → BatchSender: POST, or requeue < 30 min old
//! ```
//!
//! The registry and the buffer have independent locks and no lock is
//! held across a network call.

pub mod collector;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod sender;
mod selfstats;

pub use collector::{CollectStats, Collector};
pub use config::CollectConfig;
pub use error::CollectError;
pub use queue::IngestBuffer;
pub use registry::{GaugeFn, Registry};
