//! Retry loop: run an async operation until success, a final error, or a stop signal.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::classify;
use super::error::FetchError;
use super::policy::{RetryDecision, RetryPolicy};

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Done(T),
    /// Cancelled, or `halted` returned true, before a new attempt could start.
    Stopped,
    /// Budget exhausted, or the remote refused ranged reads.
    Failed { attempts: u32, error: FetchError },
}

/// Runs `op` until it succeeds or the policy says stop. `halted` is checked
/// before every attempt (fail-fast flags); `cancel` also interrupts the
/// backoff sleep and any in-flight attempt.
pub async fn run_with_retry<T, F, Fut, H>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    halted: H,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    H: Fn() -> bool,
{
    let mut attempt = 1u32;
    loop {
        if cancel.is_cancelled() || halted() {
            return RetryOutcome::Stopped;
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Stopped,
            r = op(attempt) => r,
        };
        let error = match result {
            Ok(v) => return RetryOutcome::Done(v),
            Err(e) => e,
        };
        match policy.decide(attempt, classify::classify(&error)) {
            RetryDecision::NoRetry => {
                return RetryOutcome::Failed {
                    attempts: attempt,
                    error,
                }
            }
            RetryDecision::RetryAfter(d) => {
                tracing::debug!(attempt, delay_ms = d.as_millis() as u64, "retrying after: {}", error);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return RetryOutcome::Stopped,
                    _ = tokio::time::sleep(d) => {}
                }
                attempt += 1;
            }
        }
    }
}
