use std::time::Duration;

/// What went wrong with one fetch attempt. Picks the backoff; only
/// `RangesRefused` ends a chunk before its attempt budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect or read timed out.
    Timeout,
    /// Remote asked us to slow down (429, 503). Waits one extra step.
    Throttled,
    /// Reset, refused, DNS, or a truncated body.
    Connection,
    /// 5xx other than 503.
    Server(u16),
    /// 4xx, unreachable, or a transport error we do not recognise.
    Rejected,
    /// The remote answered a ranged GET with the whole object. Another
    /// attempt would get the same answer; the sequential path handles it.
    RangesRefused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Capped exponential backoff with a fixed attempt budget per chunk.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per chunk, the first one included.
    pub max_attempts: u32,
    /// Wait after the first failure; doubles after each further one.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt number `failed`
    /// (1-based): base, 2×base, 4×base, ... never above `max_delay`.
    pub fn backoff(&self, failed: u32) -> Duration {
        let shift = failed.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Whether to try again after attempt `failed` ended with `kind`.
    pub fn decide(&self, failed: u32, kind: FailureKind) -> RetryDecision {
        if failed >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match kind {
            FailureKind::RangesRefused => RetryDecision::NoRetry,
            FailureKind::Throttled => RetryDecision::RetryAfter(self.backoff(failed + 1)),
            FailureKind::Timeout
            | FailureKind::Connection
            | FailureKind::Server(_)
            | FailureKind::Rejected => RetryDecision::RetryAfter(self.backoff(failed)),
        }
    }
}
