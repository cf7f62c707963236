//! Error types shared by the tally crates.

use std::fmt;

use thiserror::Error;

/// Which part of a series identity failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRole {
    Metric,
    TagKey,
    TagValue,
    HostTag,
    MetricRoot,
}

impl NameRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameRole::Metric => "metric",
            NameRole::TagKey => "tagk",
            NameRole::TagValue => "tagv",
            NameRole::HostTag => "host tag",
            NameRole::MetricRoot => "metric root",
        }
    }
}

impl fmt::Display for NameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric name, tag key or tag value contains characters outside the
/// allowed set, or is empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{role} {value:?} may only contain a to z, A to Z, 0 to 9, -, _, ., / or Unicode letters and may not be empty"
)]
pub struct ValidationError {
    pub role: NameRole,
    pub value: String,
}

/// Failure to determine the local host name.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host name lookup failed: {0}")]
    Lookup(#[source] std::io::Error),

    #[error("host name is not valid utf-8")]
    NotUtf8,

    #[error("invalid host name: {0}")]
    Invalid(#[from] ValidationError),
}

/// Errors raised while delivering a payload to an HTTP sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http handshake with {addr} failed: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: hyper::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: hyper::Error,
    },

    #[error("request to {url} timed out after {millis}ms")]
    Timeout { url: String, millis: u64 },

    #[error("unexpected response {status} from {url}: {body}")]
    Status {
        url: String,
        status: http::StatusCode,
        body: String,
    },
}
