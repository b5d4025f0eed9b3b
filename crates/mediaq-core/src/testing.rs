//! In-memory `RangeFetcher` for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::retry::FetchError;
use crate::transfer::{RangeFetcher, SourceHandle, TransferTarget};

const STREAM_BLOCK: usize = 64 * 1024;

/// Deterministic non-repeating-ish body of `len` bytes.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
struct Calls {
    resolves: Vec<String>,
    fetch_offsets: Vec<u64>,
    streams: usize,
}

pub struct MockFetcher {
    body: Vec<u8>,
    delay: Duration,
    /// offset -> (remaining failures, `usize::MAX` = always; error to return).
    failures: Mutex<HashMap<u64, (usize, fn() -> FetchError)>>,
    stream_error: Option<fn() -> FetchError>,
    resolve_error: Option<fn() -> FetchError>,
    range_endpoint: bool,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Calls>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            delay: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            stream_error: None,
            resolve_error: None,
            range_endpoint: true,
            gate: None,
            calls: Mutex::new(Calls::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn target(&self) -> TransferTarget {
        TransferTarget::new(
            SourceHandle::new("mock://object"),
            Some(self.body.len() as u64),
            true,
        )
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_offset_times(self, offset: u64, times: usize) -> Self {
        self.fail_offset_with(offset, times, || {
            FetchError::Connection("injected failure".into())
        })
    }

    /// The first `times` fetches at `offset` return `error()`.
    pub fn fail_offset_with(self, offset: u64, times: usize, error: fn() -> FetchError) -> Self {
        self.failures.lock().unwrap().insert(offset, (times, error));
        self
    }

    pub fn fail_offset_always(self, offset: u64) -> Self {
        self.fail_offset_times(offset, usize::MAX)
    }

    pub fn fail_stream(mut self) -> Self {
        self.stream_error = Some(|| FetchError::Connection("stream reset".into()));
        self
    }

    pub fn unreachable_stream(mut self) -> Self {
        self.stream_error = Some(|| FetchError::Unreachable("no such object".into()));
        self
    }

    pub fn fail_resolve(mut self) -> Self {
        self.resolve_error = Some(|| FetchError::Unreachable("no such object".into()));
        self
    }

    pub fn without_range_endpoint(mut self) -> Self {
        self.range_endpoint = false;
        self
    }

    /// Every resolve, fetch and stream waits for one permit of `gate` (the
    /// permit is returned afterwards). A gate with zero permits holds all work.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn resolves(&self) -> Vec<String> {
        self.calls.lock().unwrap().resolves.clone()
    }

    pub fn fetch_offsets(&self) -> Vec<u64> {
        self.calls.lock().unwrap().fetch_offsets.clone()
    }

    pub fn stream_calls(&self) -> usize {
        self.calls.lock().unwrap().streams
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
    }

    fn take_failure(&self, offset: u64) -> Option<FetchError> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&offset) {
            Some((0, _)) | None => None,
            Some((n, error)) => {
                if *n != usize::MAX {
                    *n -= 1;
                }
                Some(error())
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RangeFetcher for MockFetcher {
    async fn resolve(&self, source: &SourceHandle) -> Result<TransferTarget, FetchError> {
        self.calls.lock().unwrap().resolves.push(source.to_string());
        self.pass_gate().await;
        if let Some(err) = self.resolve_error {
            return Err(err());
        }
        let mut target = self.target();
        target.source = source.clone();
        Ok(target)
    }

    async fn fetch(
        &self,
        _target: &TransferTarget,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().fetch_offsets.push(offset);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.pass_gate().await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.take_failure(offset) {
            return Err(err);
        }
        let start = offset as usize;
        let end = (offset + length) as usize;
        if end > self.body.len() {
            return Err(FetchError::Http(416));
        }
        Ok(self.body[start..end].to_vec())
    }

    async fn stream(
        &self,
        _target: &TransferTarget,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<u64, FetchError> {
        self.calls.lock().unwrap().streams += 1;
        self.pass_gate().await;
        if let Some(err) = self.stream_error {
            return Err(err());
        }
        let mut sent = 0u64;
        for block in self.body.chunks(STREAM_BLOCK) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            sink.send(block.to_vec())
                .await
                .map_err(|_| FetchError::Other("stream receiver closed".into()))?;
            sent += block.len() as u64;
        }
        Ok(sent)
    }

    fn can_fetch_ranges(&self, _target: &TransferTarget) -> bool {
        self.range_endpoint
    }
}
