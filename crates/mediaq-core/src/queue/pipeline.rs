//! One job's run: download → post-process → upload, then local cleanup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::job::{DownloadJob, JobError, JobState};
use crate::notify::{StatusNotifier, StatusUpdate};
use crate::postprocess;
use crate::storage;
use crate::store::{RemoteStore, StoreError, UploadReceipt};
use crate::transfer::{ChunkedTransfer, ProgressFn, TransferError};

use super::report::{human_size, ProgressStats};
use super::states::StateBoard;

/// How a job run ended.
#[derive(Debug)]
pub(super) enum JobOutcome {
    Completed(UploadReceipt),
    Cancelled,
    Failed(JobError),
}

impl JobOutcome {
    pub(super) fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }

    pub(super) fn message(&self) -> String {
        match self {
            JobOutcome::Completed(r) if r.deduped => {
                format!("already in store: {}", r.stored.display())
            }
            JobOutcome::Completed(r) => format!("stored at {}", r.stored.display()),
            JobOutcome::Cancelled => "cancelled".to_string(),
            JobOutcome::Failed(e) => e.to_string(),
        }
    }
}

/// Services one job run needs.
pub(super) struct Pipeline {
    pub transfer: ChunkedTransfer,
    pub store: Arc<dyn RemoteStore>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub board: Arc<StateBoard>,
}

impl Pipeline {
    fn emit(&self, job: &DownloadJob, state: JobState, message: impl Into<String>) {
        self.board.advance(&job.id, state);
        self.notifier.notify(StatusUpdate {
            job_id: job.id.clone(),
            name: job.name.clone(),
            state,
            message: message.into(),
        });
    }

    /// Run the stages and remove local files. The terminal notification is
    /// left to the caller.
    pub(super) async fn run(&self, job: &DownloadJob) -> JobOutcome {
        let mut local_files = vec![storage::temp_path(&job.destination), job.destination.clone()];
        let outcome = self.stages(job, &mut local_files).await;
        storage::remove_local_files(local_files.iter().map(PathBuf::as_path));
        outcome
    }

    async fn stages(&self, job: &DownloadJob, local_files: &mut Vec<PathBuf>) -> JobOutcome {
        if job.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        self.emit(job, JobState::Downloading, format!("resolving {}", job.source));

        let fetcher = self.transfer.fetcher();
        let target = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return JobOutcome::Cancelled,
            r = fetcher.resolve(&job.source) => match r {
                Ok(t) => t,
                Err(e) => return JobOutcome::Failed(JobError::Resolve(e.to_string())),
            },
        };

        let size = target.size.map(human_size).unwrap_or_else(|| "unknown size".into());
        self.emit(job, JobState::Downloading, format!("downloading ({})", size));

        let started = Instant::now();
        let notifier = Arc::clone(&self.notifier);
        let (id, name) = (job.id.clone(), job.name.clone());
        let progress: ProgressFn = Arc::new(move |done, total| {
            let stats = ProgressStats {
                bytes_done: done,
                total_bytes: total,
                elapsed: started.elapsed(),
            };
            notifier.notify(StatusUpdate {
                job_id: id.clone(),
                name: name.clone(),
                state: JobState::Downloading,
                message: stats.message(),
            });
        });

        let report = match self
            .transfer
            .download(&target, &job.destination, job.concurrency, Some(progress), &job.cancel)
            .await
        {
            Ok(r) => r,
            Err(TransferError::Cancelled) => return JobOutcome::Cancelled,
            Err(e) => return JobOutcome::Failed(JobError::Transfer(e)),
        };
        tracing::info!(
            job_id = %job.id,
            bytes = report.bytes,
            mode = ?report.mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "download finished"
        );

        if job.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        self.emit(job, JobState::PostProcessing, "detecting container");
        let downloaded = job.destination.clone();
        let token = job.cancel.clone();
        let processed = tokio::task::spawn_blocking(move || postprocess::normalize_extension(&downloaded, &token))
            .await
            .map_err(|e| anyhow::anyhow!("post-process task: {}", e))
            .and_then(|r| r);
        let final_path = match processed {
            Ok(Some(p)) => p,
            Ok(None) => return JobOutcome::Cancelled,
            Err(e) => return JobOutcome::Failed(JobError::PostProcessFailed(format!("{:#}", e))),
        };
        if final_path != job.destination {
            local_files.push(final_path.clone());
        }

        if job.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.emit(
            job,
            JobState::Uploading,
            format!("uploading {} to {}", file_name, job.upload_dir),
        );
        // The store checks the token itself; `Ok` means the file is stored.
        match self.store.upload(&final_path, &job.upload_dir, &job.cancel).await {
            Ok(receipt) => JobOutcome::Completed(receipt),
            Err(StoreError::Cancelled) => JobOutcome::Cancelled,
            Err(e) => JobOutcome::Failed(JobError::UploadFailed(e)),
        }
    }
}
