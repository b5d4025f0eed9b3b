//! Download queue: FIFO backlog, bounded number of running jobs, per-job
//! cancellation, and status notifications at every transition.
//!
//! `QueueManager` is a cheap `Clone` handle over shared state; `submit` and
//! `cancel` may be called from any task or thread inside the Tokio runtime.
//! The state lock is a `std::sync::Mutex` and is never held across an await.

mod pipeline;
pub mod report;
mod states;

use std::collections::{HashMap, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::job::{DownloadJob, JobError, JobId, JobRequest, JobState};
use crate::notify::{StatusNotifier, StatusUpdate};
use crate::storage;
use crate::store::RemoteStore;
use crate::transfer::ChunkedTransfer;

use pipeline::{JobOutcome, Pipeline};
use states::StateBoard;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("job has an empty destination path")]
    EmptyDestination,
    #[error("job has an empty source")]
    EmptySource,
    #[error("job id {0} is already queued or running")]
    DuplicateId(JobId),
}

#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// Jobs allowed to run at once.
    pub max_concurrent_jobs: usize,
    /// Chunk concurrency for jobs that do not set their own.
    pub chunk_concurrency: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            chunk_concurrency: 4,
        }
    }
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<DownloadJob>,
    active: HashMap<JobId, CancellationToken>,
    next_id: u64,
}

impl QueueState {
    fn contains(&self, id: &JobId) -> bool {
        self.active.contains_key(id) || self.backlog.iter().any(|j| &j.id == id)
    }

    fn generate_id(&mut self) -> JobId {
        loop {
            self.next_id += 1;
            let id = JobId::new(format!("job-{}", self.next_id));
            if !self.contains(&id) {
                return id;
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.active.is_empty() && self.backlog.is_empty()
    }
}

struct Inner {
    pipeline: Pipeline,
    options: QueueOptions,
    state: Mutex<QueueState>,
    board: Arc<StateBoard>,
    idle: Notify,
}

#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    pub fn new(
        transfer: ChunkedTransfer,
        store: Arc<dyn RemoteStore>,
        notifier: Arc<dyn StatusNotifier>,
        options: QueueOptions,
    ) -> Self {
        let options = QueueOptions {
            max_concurrent_jobs: options.max_concurrent_jobs.max(1),
            chunk_concurrency: options.chunk_concurrency.max(1),
        };
        let board = Arc::new(StateBoard::default());
        Self {
            inner: Arc::new(Inner {
                pipeline: Pipeline {
                    transfer,
                    store,
                    notifier,
                    board: Arc::clone(&board),
                },
                options,
                state: Mutex::new(QueueState::default()),
                board,
                idle: Notify::new(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, job: &DownloadJob, state: JobState, message: impl Into<String>) {
        self.inner.pipeline.notifier.notify(StatusUpdate {
            job_id: job.id.clone(),
            name: job.name.clone(),
            state,
            message: message.into(),
        });
    }

    /// Queue a job and return its id without waiting for it to start.
    ///
    /// Must be called from within a Tokio runtime: admission spawns the job task.
    pub fn submit(&self, request: JobRequest) -> Result<JobId, SubmitError> {
        if request.destination.as_os_str().is_empty() {
            return Err(SubmitError::EmptyDestination);
        }
        if request.source.as_str().trim().is_empty() {
            return Err(SubmitError::EmptySource);
        }

        let (job, position) = {
            let mut st = self.lock_state();
            let id = match request.id.clone() {
                Some(id) if st.contains(&id) => return Err(SubmitError::DuplicateId(id)),
                Some(id) => id,
                None => st.generate_id(),
            };
            let job = DownloadJob::from_request(id, request, self.inner.options.chunk_concurrency);
            self.inner.board.queued(&job.id);
            st.backlog.push_back(job.clone());
            (job, st.backlog.len())
        };

        tracing::info!(job_id = %job.id, source = %job.source, "job queued");
        self.notify(&job, JobState::Queued, format!("queued (position {})", position));
        self.pump();
        Ok(job.id)
    }

    /// Cancel a job. Running jobs get their token cancelled and finish as
    /// Cancelled at the next checkpoint; queued jobs are removed right away.
    /// Returns false for unknown or already finished ids.
    pub fn cancel(&self, id: &JobId) -> bool {
        let removed = {
            let mut st = self.lock_state();
            if let Some(token) = st.active.get(id) {
                // The outcome is already decided and reported.
                if self.inner.board.is_finished(id) {
                    return false;
                }
                token.cancel();
                tracing::info!(job_id = %id, "cancel requested for running job");
                return true;
            }
            let Some(pos) = st.backlog.iter().position(|j| &j.id == id) else {
                return false;
            };
            st.backlog.remove(pos)
        };

        let Some(job) = removed else {
            return false;
        };
        job.cancel.cancel();
        self.inner.board.finish(id, JobState::Cancelled);
        tracing::info!(job_id = %id, "queued job cancelled");
        self.notify(&job, JobState::Cancelled, "cancelled before start");
        self.wake_if_idle();
        true
    }

    /// Cancel every queued and running job.
    pub fn cancel_all(&self) {
        let ids: Vec<JobId> = {
            let st = self.lock_state();
            st.backlog
                .iter()
                .map(|j| j.id.clone())
                .chain(st.active.keys().cloned())
                .collect()
        };
        for id in ids {
            self.cancel(&id);
        }
    }

    /// Current lifecycle state of a job. Finished jobs keep their terminal
    /// state; ids the queue never saw give `None`.
    pub fn state(&self, id: &JobId) -> Option<JobState> {
        self.inner.board.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.lock_state().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock_state().backlog.len()
    }

    /// Ids of queued jobs in admission order.
    pub fn queued_ids(&self) -> Vec<JobId> {
        self.lock_state().backlog.iter().map(|j| j.id.clone()).collect()
    }

    pub fn active_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.lock_state().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.lock_state().is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn wake_if_idle(&self) {
        if self.lock_state().is_idle() {
            self.inner.idle.notify_waiters();
        }
    }

    /// Admit backlog jobs while the budget allows. Safe to call from anywhere
    /// and any number of times; the lock makes admission decisions atomic.
    fn pump(&self) {
        let admitted: Vec<DownloadJob> = {
            let mut st = self.lock_state();
            let mut admitted = Vec::new();
            while st.active.len() < self.inner.options.max_concurrent_jobs {
                let Some(job) = st.backlog.pop_front() else {
                    break;
                };
                st.active.insert(job.id.clone(), job.cancel.clone());
                admitted.push(job);
            }
            admitted
        };

        for job in admitted {
            tracing::debug!(job_id = %job.id, "job admitted");
            let manager = self.clone();
            tokio::spawn(async move { manager.execute(job).await });
        }
    }

    async fn execute(self, job: DownloadJob) {
        let runner = self.clone();
        let run_job = job.clone();
        let outcome = match tokio::spawn(async move { runner.inner.pipeline.run(&run_job).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %job.id, "job task aborted: {}", e);
                let temp = storage::temp_path(&job.destination);
                storage::remove_local_files([temp.as_path(), job.destination.as_path()]);
                JobOutcome::Failed(JobError::Aborted(e.to_string()))
            }
        };

        let state = outcome.state();
        match &outcome {
            JobOutcome::Failed(e) => {
                tracing::warn!(job_id = %job.id, "job failed: {}", e)
            }
            _ => tracing::info!(job_id = %job.id, %state, "job finished"),
        }
        self.inner.board.finish(&job.id, state);
        self.notify(&job, state, outcome.message());

        self.lock_state().active.remove(&job.id);
        self.pump();
        self.wake_if_idle();
    }
}
