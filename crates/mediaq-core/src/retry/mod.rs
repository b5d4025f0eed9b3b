//! Retry and backoff policy.
//!
//! Failure classification and capped exponential backoff for the chunk
//! tasks of a transfer.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_http_status};
pub use error::FetchError;
pub use policy::{FailureKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryOutcome};
