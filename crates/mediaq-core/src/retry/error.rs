//! Error returned by one ranged fetch or one sequential stream.

use thiserror::Error;

/// Failure of a single fetch against the remote object. Kept transport
/// agnostic so any `RangeFetcher` can report it and the retry policy can
/// classify it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connect or read timed out.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Network-level failure (reset, refused, DNS, truncated response).
    #[error("connection failed: {0}")]
    Connection(String),
    /// Remote answered with a non-success status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Fewer (or more) bytes than requested came back for a range.
    #[error("short read: expected {expected} bytes, got {received}")]
    ShortRead { expected: u64, received: u64 },
    /// The object cannot be resolved or accessed at all.
    #[error("target unreachable: {0}")]
    Unreachable(String),
    /// Remote ignored the Range request.
    #[error("ranged access not supported by remote")]
    RangeUnsupported,
    /// Anything else the transport reported.
    #[error("{0}")]
    Other(String),
}
