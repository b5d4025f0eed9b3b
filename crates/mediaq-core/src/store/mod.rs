//! Where finished files go after post-processing.

mod local;

pub use local::LocalDirStore;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Location of the file in the store.
    pub stored: PathBuf,
    /// The store already held identical content, nothing was transferred.
    pub deduped: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid destination directory {0:?}")]
    InvalidDestination(String),
    #[error("local file {0} has no file name")]
    NoFileName(PathBuf),
    #[error("{0}")]
    Io(String),
    /// Stopped before the file became visible in the store.
    #[error("upload cancelled")]
    Cancelled,
}

impl StoreError {
    pub(crate) fn io(e: anyhow::Error) -> Self {
        Self::Io(format!("{:#}", e))
    }
}

/// Destination storage for finished downloads. Implementations create
/// `destination_dir` (recursively) when it does not exist.
///
/// `Ok` means the file is in the store. When `cancel` fires first, the
/// store is left without the file and `StoreError::Cancelled` is returned.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upload(
        &self,
        local_path: &Path,
        destination_dir: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, StoreError>;
}
