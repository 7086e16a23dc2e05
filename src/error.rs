//! # Error Taxonomy
//!
//! One error enum covers the whole crate. The variants map to the failure
//! classes the system actually distinguishes in behavior:
//!
//! - [`TideError::Network`]: transport or timeout failures talking to NOAA.
//! - [`TideError::DataUnavailable`]: a well-formed response with no usable
//!   records (e.g. an empty prediction set after filtering bad rows).
//! - [`TideError::InvalidSelection`]: a station selection missing a valid
//!   id or coordinates; rejected before it is persisted.
//! - [`TideError::CacheCorrupt`]: persisted bytes that fail to decode.
//!   Handled locally by treating the entry as absent; callers never see it.
//!
//! The enum is `Clone` because one fetch outcome fans out to every waiter
//! coalesced behind a single-flight refresh, so variants carry rendered
//! messages rather than non-cloneable source errors.

use thiserror::Error;

/// Errors surfaced by the directory service and the fetch collaborators.
#[derive(Debug, Clone, Error)]
pub enum TideError {
    /// HTTP transport, timeout, or protocol failure.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream answered, but yielded no usable records.
    #[error("no usable records: {0}")]
    DataUnavailable(String),

    /// A station selection lacks a valid id or in-range coordinates.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Persisted cache bytes failed to decode. Never propagates past the
    /// cache layer; logged and treated as a cache miss.
    #[error("corrupt cache entry: {0}")]
    CacheCorrupt(String),
}

impl From<reqwest::Error> for TideError {
    fn from(e: reqwest::Error) -> Self {
        TideError::Network(e.to_string())
    }
}
