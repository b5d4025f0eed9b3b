//! Chunked parallel transfer with sequential fallback.
//!
//! A transfer of a known-size object that accepts ranged reads is split into
//! fixed-size chunks fetched concurrently (bounded by a semaphore) and written
//! at their offsets into a preallocated `.part` file. If any chunk exhausts its
//! retries the whole object is re-downloaded with one sequential stream.
//! Objects with unknown size, below the parallel threshold, or behind an
//! endpoint the fetcher cannot range-read go straight to the sequential path.

mod fetcher;
mod parallel;
mod progress;
mod sequential;

pub use fetcher::RangeFetcher;
pub use progress::{ProgressFn, ProgressThrottle, TransferState};

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::retry::{FetchError, RetryPolicy};
use sequential::SequentialError;

/// Opaque reference to a remote object, as understood by a `RangeFetcher`
/// (a URL for the HTTP fetcher).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle(String);

impl SourceHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved remote object.
#[derive(Debug, Clone)]
pub struct TransferTarget {
    pub source: SourceHandle,
    /// Total size in bytes, when the remote reported one.
    pub size: Option<u64>,
    /// Remote advertised ranged reads.
    pub accepts_ranges: bool,
    /// Filename suggested by the remote (e.g. Content-Disposition), if any.
    pub name_hint: Option<String>,
}

impl TransferTarget {
    pub fn new(source: SourceHandle, size: Option<u64>, accepts_ranges: bool) -> Self {
        Self {
            source,
            size,
            accepts_ranges,
            name_hint: None,
        }
    }
}

/// Tunables for `ChunkedTransfer`.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub chunk_size: u64,
    /// Objects smaller than this are streamed sequentially.
    pub min_parallel_size: u64,
    pub progress_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512 * 1024,
            min_parallel_size: 10 * 1024 * 1024,
            progress_interval: Duration::from_secs(3),
            retry: RetryPolicy::default(),
        }
    }
}

/// Why a transfer used the sequential path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequentialReason {
    UnknownSize,
    BelowThreshold,
    RangesUnsupported,
    /// The fetcher cannot issue ranged reads against the target's endpoint.
    EndpointMismatch,
    /// The parallel attempt failed and the object was re-downloaded.
    ParallelFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Parallel { chunks: usize },
    Sequential(SequentialReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: u64,
    pub mode: TransferMode,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("chunk at offset {offset} failed after {attempts} attempts: {source}")]
    ChunkFetchFailed {
        offset: u64,
        attempts: u32,
        source: FetchError,
    },
    /// The sequential stream failed. `after_parallel` carries the parallel
    /// failure that triggered it, when this was a fallback.
    #[error("sequential fallback failed: {source}{}", parallel_note(.after_parallel))]
    FallbackFailed {
        after_parallel: Option<Box<TransferError>>,
        source: FetchError,
    },
    #[error("storage: {0}")]
    Storage(String),
}

fn parallel_note(after_parallel: &Option<Box<TransferError>>) -> String {
    match after_parallel {
        Some(e) => format!(" (after parallel failure: {})", e),
        None => String::new(),
    }
}

impl TransferError {
    pub(crate) fn storage(e: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", e))
    }
}

/// Downloads one resolved target to a local path.
#[derive(Clone)]
pub struct ChunkedTransfer {
    fetcher: Arc<dyn RangeFetcher>,
    options: TransferOptions,
}

impl ChunkedTransfer {
    pub fn new(fetcher: Arc<dyn RangeFetcher>, options: TransferOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn fetcher(&self) -> &Arc<dyn RangeFetcher> {
        &self.fetcher
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Decide the path for `target`: `Ok(size)` for parallel, otherwise the
    /// reason it must be streamed.
    pub fn parallel_size(&self, target: &TransferTarget) -> Result<u64, SequentialReason> {
        let size = target.size.ok_or(SequentialReason::UnknownSize)?;
        if size < self.options.min_parallel_size || size == 0 {
            return Err(SequentialReason::BelowThreshold);
        }
        if !target.accepts_ranges {
            return Err(SequentialReason::RangesUnsupported);
        }
        if !self.fetcher.can_fetch_ranges(target) {
            return Err(SequentialReason::EndpointMismatch);
        }
        Ok(size)
    }

    /// Download `target` into `dest`, writing through `dest` + `.part` and
    /// renaming on success. On any error, cancellation included, the `.part`
    /// file is removed and `dest` is left untouched. `cancel` is the caller's
    /// (job-level) token; the transfer runs under a child of it that is
    /// cancelled when this call returns, so stray fetches never outlive the
    /// transfer.
    pub async fn download(
        &self,
        target: &TransferTarget,
        dest: &Path,
        concurrency: usize,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferError> {
        let result = self.attempt(target, dest, concurrency, progress, cancel).await;
        if result.is_err() {
            let part = crate::storage::temp_path(dest);
            crate::storage::remove_local_files([part.as_path()]);
        }
        result
    }

    async fn attempt(
        &self,
        target: &TransferTarget,
        dest: &Path,
        concurrency: usize,
        progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferError> {
        let cancel = cancel.child_token();
        let _stop_on_return = cancel.clone().drop_guard();
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let throttle = Arc::new(ProgressThrottle::new(
            progress,
            target.size,
            self.options.progress_interval,
        ));

        let (reason, after_parallel) = match self.parallel_size(target) {
            Ok(size) => {
                let result = parallel::run(
                    &self.fetcher,
                    target,
                    size,
                    dest,
                    self.options.chunk_size,
                    concurrency,
                    self.options.retry,
                    &throttle,
                    &cancel,
                )
                .await;
                match result {
                    Ok(chunks) => {
                        return Ok(TransferReport {
                            bytes: size,
                            mode: TransferMode::Parallel { chunks },
                        })
                    }
                    Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
                    Err(e) => {
                        tracing::warn!(
                            source = %target.source,
                            "parallel transfer failed, falling back to sequential: {}",
                            e
                        );
                        (SequentialReason::ParallelFailed, Some(Box::new(e)))
                    }
                }
            }
            Err(reason) => {
                tracing::debug!(source = %target.source, ?reason, "using sequential transfer");
                (reason, None)
            }
        };

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        match sequential::run(&self.fetcher, target, dest, &throttle, &cancel).await {
            Ok(bytes) => Ok(TransferReport {
                bytes,
                mode: TransferMode::Sequential(reason),
            }),
            Err(SequentialError::Cancelled) => Err(TransferError::Cancelled),
            Err(SequentialError::Storage(msg)) => Err(TransferError::Storage(msg)),
            Err(SequentialError::Fetch(FetchError::Unreachable(msg))) if after_parallel.is_none() => {
                Err(TransferError::TargetUnreachable(msg))
            }
            Err(SequentialError::Fetch(source)) => Err(TransferError::FallbackFailed {
                after_parallel,
                source,
            }),
        }
    }
}
