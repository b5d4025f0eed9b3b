//! Sequential transfer: one stream from byte 0 into a fresh partial file.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::retry::FetchError;
use crate::storage::PartFile;

use super::fetcher::RangeFetcher;
use super::progress::{ProgressThrottle, TransferState};
use super::TransferTarget;

/// Blocks buffered between the fetcher and the disk writer.
const STREAM_QUEUE_DEPTH: usize = 16;

#[derive(Debug)]
pub(super) enum SequentialError {
    Cancelled,
    Fetch(FetchError),
    Storage(String),
}

/// Stream the whole object into `dest`. Any partial file from an earlier
/// attempt is truncated. Returns the number of bytes written.
pub(super) async fn run(
    fetcher: &Arc<dyn RangeFetcher>,
    target: &TransferTarget,
    dest: &Path,
    throttle: &Arc<ProgressThrottle>,
    cancel: &CancellationToken,
) -> Result<u64, SequentialError> {
    let storage_err = |e: anyhow::Error| SequentialError::Storage(format!("{:#}", e));

    let part = PartFile::create(dest).map_err(storage_err)?;
    if let Some(size) = target.size {
        part.preallocate(size).map_err(storage_err)?;
    }
    let state = TransferState::new(target.size, cancel.clone(), Arc::clone(throttle));

    let (tx, rx) = mpsc::channel::<Vec<u8>>(STREAM_QUEUE_DEPTH);
    let producer = fetcher.stream(target, tx);
    let consumer = async {
        // Owned here so an early return drops the receiver and unblocks the producer.
        let mut rx = rx;
        let mut offset = 0u64;
        while let Some(block) = rx.recv().await {
            if state.should_stop() {
                return Err(SequentialError::Cancelled);
            }
            let len = block.len() as u64;
            if let Some(size) = target.size {
                if offset + len > size {
                    return Err(SequentialError::Fetch(FetchError::ShortRead {
                        expected: size,
                        received: offset + len,
                    }));
                }
            }
            part.write_chunk(offset, block)
                .await
                .map_err(storage_err)?;
            offset += len;
            state.add_completed(len);
        }
        Ok(offset)
    };

    let (produced, consumed) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SequentialError::Cancelled),
        pair = async { tokio::join!(producer, consumer) } => pair,
    };

    // The consumer's error wins: when it bails out the producer only sees a
    // closed channel.
    let written = consumed?;
    if cancel.is_cancelled() {
        return Err(SequentialError::Cancelled);
    }
    produced.map_err(SequentialError::Fetch)?;
    if let Some(size) = target.size {
        if written != size {
            return Err(SequentialError::Fetch(FetchError::ShortRead {
                expected: size,
                received: written,
            }));
        }
    }

    part.commit(dest).map_err(storage_err)?;
    state.finish();
    tracing::debug!(bytes = written, "sequential transfer complete");
    Ok(written)
}
