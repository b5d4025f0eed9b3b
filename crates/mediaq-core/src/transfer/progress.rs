//! Per-transfer shared state: completed-bytes counter, fail-fast flag,
//! cancellation, and throttled progress emission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Progress callback: `(bytes_completed, total_bytes)`. `total_bytes` is 0
/// when the size is unknown. Called from chunk tasks while the progress lock
/// is held, so it must return quickly and never block.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Gate {
    last_emit: Instant,
    reported: u64,
}

/// Rate-limits progress callbacks for one `ChunkedTransfer::download` call.
///
/// Shared by the parallel attempt and the sequential fallback so the values
/// handed to the callback never go backwards, even when the fallback restarts
/// from byte 0.
pub struct ProgressThrottle {
    callback: Option<ProgressFn>,
    total: u64,
    interval: Duration,
    gate: Mutex<Gate>,
}

impl ProgressThrottle {
    pub fn new(callback: Option<ProgressFn>, total: Option<u64>, interval: Duration) -> Self {
        Self {
            callback,
            total: total.unwrap_or(0),
            interval,
            gate: Mutex::new(Gate {
                last_emit: Instant::now(),
                reported: 0,
            }),
        }
    }

    /// Emit `completed` if the interval has passed since the last emission, or
    /// unconditionally when `force` is set.
    fn offer(&self, completed: u64, force: bool) {
        let mut gate = lock(&self.gate);
        let now = Instant::now();
        if !force && now.duration_since(gate.last_emit) < self.interval {
            return;
        }
        let value = completed.max(gate.reported);
        gate.reported = value;
        gate.last_emit = now;
        if let Some(cb) = &self.callback {
            cb(value, self.total);
        }
    }
}

/// State of one transfer phase (the parallel attempt or the sequential
/// fallback). Dropped when the phase returns.
pub struct TransferState {
    total: Option<u64>,
    completed: Mutex<u64>,
    failed: AtomicBool,
    cancel: CancellationToken,
    throttle: Arc<ProgressThrottle>,
}

impl TransferState {
    pub fn new(
        total: Option<u64>,
        cancel: CancellationToken,
        throttle: Arc<ProgressThrottle>,
    ) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            failed: AtomicBool::new(false),
            cancel,
            throttle,
        }
    }

    /// Add `len` finished bytes and maybe emit progress. The counter update and
    /// the throttle check happen under the same lock, so emitted values follow
    /// counter order. Returns the new total.
    pub fn add_completed(&self, len: u64) -> u64 {
        let mut done = lock(&self.completed);
        *done += len;
        debug_assert!(self.total.map_or(true, |t| *done <= t));
        self.throttle.offer(*done, false);
        *done
    }

    pub fn completed(&self) -> u64 {
        *lock(&self.completed)
    }

    /// Force one last emission of the final count.
    pub fn finish(&self) {
        let done = lock(&self.completed);
        self.throttle.offer(*done, true);
    }

    /// Set the fail-fast flag. Irreversible.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the phase is cancelled or has permanently failed; no new
    /// chunk or retry may start after that.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.is_failed()
    }
}
