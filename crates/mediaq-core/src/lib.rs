//! mediaq core: chunked parallel transfers with sequential fallback, and a
//! bounded download queue that runs each job through download, container
//! detection and upload.

pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod http;
pub mod job;
pub mod naming;
pub mod notify;
pub mod postprocess;
pub mod queue;
pub mod retry;
pub mod segmenter;
pub mod storage;
pub mod store;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use job::{JobError, JobId, JobRequest, JobState};
pub use notify::{StatusNotifier, StatusUpdate};
pub use queue::{QueueManager, QueueOptions, SubmitError};
pub use store::{RemoteStore, UploadReceipt};
pub use transfer::{
    ChunkedTransfer, RangeFetcher, SourceHandle, TransferError, TransferOptions, TransferTarget,
};
