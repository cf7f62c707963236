use thiserror::Error;

use tally_core::{HostError, ValidationError};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("must specify a non-empty metadata host")]
    EmptyHost,

    #[error("metadata tracker already started")]
    AlreadyStarted,

    #[error("metadata tracker must be started inside a tokio runtime")]
    NoRuntime,
}
