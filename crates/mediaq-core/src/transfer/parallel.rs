//! Parallel ranged transfer: fixed-size chunks, bounded concurrency, per-chunk
//! retry, fail-fast on the first permanent failure.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::retry::{run_with_retry, FetchError, RetryOutcome, RetryPolicy};
use crate::segmenter::{plan_chunks, Chunk};
use crate::storage::PartFile;

use super::fetcher::RangeFetcher;
use super::progress::{ProgressThrottle, TransferState};
use super::{TransferError, TransferTarget};

enum ChunkResult {
    Written,
    /// Never fetched or dropped because the phase stopped first.
    Skipped,
    Failed(TransferError),
}

/// Download `size` bytes of `target` into `dest` with at most `concurrency`
/// chunk fetches in flight. Returns the number of chunks on success. On any
/// error the partial file is left in place for the caller to overwrite or remove.
#[allow(clippy::too_many_arguments)]
pub(super) async fn run(
    fetcher: &Arc<dyn RangeFetcher>,
    target: &TransferTarget,
    size: u64,
    dest: &Path,
    chunk_size: u64,
    concurrency: usize,
    policy: RetryPolicy,
    throttle: &Arc<ProgressThrottle>,
    cancel: &CancellationToken,
) -> Result<usize, TransferError> {
    let part = PartFile::create(dest).map_err(TransferError::storage)?;
    part.preallocate(size).map_err(TransferError::storage)?;

    let chunks = plan_chunks(size, chunk_size);
    let state = Arc::new(TransferState::new(
        Some(size),
        cancel.clone(),
        Arc::clone(throttle),
    ));
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    tracing::debug!(
        chunks = chunks.len(),
        chunk_size,
        concurrency,
        "starting parallel transfer of {} bytes",
        size
    );

    let mut tasks = JoinSet::new();
    for chunk in chunks.iter().copied() {
        tasks.spawn(fetch_chunk(
            Arc::clone(fetcher),
            target.clone(),
            chunk,
            part.clone(),
            Arc::clone(&state),
            Arc::clone(&semaphore),
            policy,
        ));
    }

    let mut first_error: Option<TransferError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(ChunkResult::Written) | Ok(ChunkResult::Skipped) => {}
            Ok(ChunkResult::Failed(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                state.mark_failed();
                first_error.get_or_insert(TransferError::Storage(format!(
                    "chunk task aborted: {}",
                    join_err
                )));
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    if state.completed() != size {
        return Err(TransferError::Storage(format!(
            "parallel transfer wrote {} of {} bytes",
            state.completed(),
            size
        )));
    }

    part.commit(dest).map_err(TransferError::storage)?;
    state.finish();
    Ok(chunks.len())
}

async fn fetch_chunk(
    fetcher: Arc<dyn RangeFetcher>,
    target: TransferTarget,
    chunk: Chunk,
    part: PartFile,
    state: Arc<TransferState>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
) -> ChunkResult {
    if state.should_stop() {
        return ChunkResult::Skipped;
    }
    let _permit = tokio::select! {
        biased;
        _ = state.cancel_token().cancelled() => return ChunkResult::Skipped,
        permit = semaphore.acquire_owned() => match permit {
            Ok(p) => p,
            Err(_) => return ChunkResult::Skipped,
        },
    };

    let fetcher = &fetcher;
    let target = &target;
    let outcome = run_with_retry(
        &policy,
        state.cancel_token(),
        || state.is_failed(),
        move |_attempt| async move {
            let data = fetcher.fetch(target, chunk.offset, chunk.length).await?;
            if data.len() as u64 != chunk.length {
                return Err(FetchError::ShortRead {
                    expected: chunk.length,
                    received: data.len() as u64,
                });
            }
            Ok(data)
        },
    )
    .await;

    match outcome {
        RetryOutcome::Done(data) => {
            // No writes after cancellation.
            if state.should_stop() {
                return ChunkResult::Skipped;
            }
            if let Err(e) = part.write_chunk(chunk.offset, data).await {
                state.mark_failed();
                return ChunkResult::Failed(TransferError::storage(e));
            }
            state.add_completed(chunk.length);
            ChunkResult::Written
        }
        RetryOutcome::Stopped => ChunkResult::Skipped,
        RetryOutcome::Failed { attempts, error } => {
            state.mark_failed();
            tracing::warn!(
                offset = chunk.offset,
                end = chunk.end(),
                attempts,
                "chunk failed: {}",
                error
            );
            ChunkResult::Failed(TransferError::ChunkFetchFailed {
                offset: chunk.offset,
                attempts,
                source: error,
            })
        }
    }
}
