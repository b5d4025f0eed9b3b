//! Map fetch failures onto retry kinds.

use crate::retry::error::FetchError;
use crate::retry::policy::FailureKind;

pub fn classify_http_status(code: u32) -> FailureKind {
    match code {
        429 | 503 => FailureKind::Throttled,
        500..=599 => FailureKind::Server(code as u16),
        _ => FailureKind::Rejected,
    }
}

/// A truncated range counts as connection trouble (the server dropped us
/// mid-body).
pub fn classify(e: &FetchError) -> FailureKind {
    match e {
        FetchError::Timeout(_) => FailureKind::Timeout,
        FetchError::Connection(_) | FetchError::ShortRead { .. } => FailureKind::Connection,
        FetchError::Http(code) => classify_http_status(*code),
        FetchError::RangeUnsupported => FailureKind::RangesRefused,
        FetchError::Unreachable(_) | FetchError::Other(_) => FailureKind::Rejected,
    }
}
