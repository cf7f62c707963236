//! Errors surfaced synchronously to callers of the collector.
//!
//! Delivery failures never appear here; they are handled inside the
//! sender task.

use thiserror::Error;

use tally_core::{HostError, ValidationError};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("collector must be initialized before use")]
    NotInitialized,

    #[error("collector cannot be initialized twice")]
    AlreadyInitialized,

    #[error("must specify a non-empty sink host")]
    EmptyHost,

    #[error("collector must be initialized inside a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("ingestion channel closed")]
    Closed,
}
