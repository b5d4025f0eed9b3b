//! Download jobs and their lifecycle states.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::store::StoreError;
use crate::transfer::{SourceHandle, TransferError};

/// Job identifier: caller-assigned or generated by the queue (`job-N`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Queued,
    Downloading,
    PostProcessing,
    Uploading,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Downloading => "downloading",
            JobState::PostProcessing => "postprocessing",
            JobState::Uploading => "uploading",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Queued, Downloading)
            | (Downloading, PostProcessing)
            | (PostProcessing, Uploading)
            | (Uploading, Completed) => true,
            (Queued | Downloading | PostProcessing | Uploading, Cancelled) => true,
            (Downloading | PostProcessing | Uploading, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller submits.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Caller-chosen id; the queue generates one when `None`.
    pub id: Option<JobId>,
    /// Display name used in notifications.
    pub name: String,
    pub source: SourceHandle,
    /// Local path the download is written to.
    pub destination: PathBuf,
    /// Directory in the remote store the result is uploaded into.
    pub upload_dir: String,
    /// Per-job chunk concurrency; the manager's default when `None`.
    pub concurrency: Option<usize>,
}

impl JobRequest {
    pub fn new(source: SourceHandle, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string());
        Self {
            id: None,
            name,
            source,
            destination,
            upload_dir: String::new(),
            concurrency: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_upload_dir(mut self, dir: impl Into<String>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }
}

/// A job owned by the queue. The token is the job-level cancellation signal;
/// the transfer runs under a child of it.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub name: String,
    pub source: SourceHandle,
    pub destination: PathBuf,
    pub upload_dir: String,
    pub concurrency: usize,
    pub cancel: CancellationToken,
}

impl DownloadJob {
    pub(crate) fn from_request(id: JobId, request: JobRequest, default_concurrency: usize) -> Self {
        Self {
            id,
            name: request.name,
            source: request.source,
            destination: request.destination,
            upload_dir: request.upload_dir,
            concurrency: request.concurrency.unwrap_or(default_concurrency).max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("resolve failed: {0}")]
    Resolve(String),
    #[error("download failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("post-processing failed: {0}")]
    PostProcessFailed(String),
    #[error("upload failed: {0}")]
    UploadFailed(#[from] StoreError),
    #[error("job aborted: {0}")]
    Aborted(String),
}
