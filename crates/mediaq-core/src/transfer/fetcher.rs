//! The transport seam: anything that can read byte ranges of a remote object.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::retry::FetchError;

use super::{SourceHandle, TransferTarget};

/// Reads a remote object either by range or as one sequential stream.
///
/// `fetch` must be safe to call concurrently for disjoint ranges of the same
/// target; the chunked client relies on that for parallelism.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Resolve an opaque handle into a target with size and ranged-access support.
    async fn resolve(&self, source: &SourceHandle) -> Result<TransferTarget, FetchError>;

    /// Read exactly `[offset, offset + length)` of the object.
    async fn fetch(
        &self,
        target: &TransferTarget,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, FetchError>;

    /// Read the whole object from offset 0, sending blocks to `sink` in order.
    /// Returns the number of bytes sent. Implementations stop early with an
    /// error once the receiving side of `sink` is dropped.
    async fn stream(
        &self,
        target: &TransferTarget,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<u64, FetchError>;

    /// Whether this fetcher can issue ranged reads against the target's
    /// endpoint. Returning false (e.g. the object lives on another shard than
    /// the one this client is bound to) routes the transfer to the sequential path.
    fn can_fetch_ranges(&self, _target: &TransferTarget) -> bool {
        true
    }
}
