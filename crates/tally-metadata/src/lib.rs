//! tally-metadata — descriptive metadata about metric series.
//!
//! Metadata entries (rate type, unit, description, anything else keyed
//! by name) are stored per `(metric, tags, name)`. Overwrites are
//! compared against the stored value and logged when they change. A
//! background task posts the whole map to `/api/metadata/put` once
//! after a short warm-up and then on a slow fixed cadence.
//!
//! # Architecture
//!
//! ```text
//! types    ← MetaKey, MetaValue, RateType, Unit, wire record
//! tracker  ← MetadataTracker: add_meta(), producers, flush(), start()/shutdown()
//! ```

pub mod error;
pub mod tracker;
pub mod types;

pub use error::MetadataError;
pub use tracker::{
    META_PUT_PATH, MetaUpdate, MetadataConfig, MetadataTracker, WeakMetadataTracker,
};
pub use types::{MetaKey, MetaSend, MetaValue, RateType, Unit};
