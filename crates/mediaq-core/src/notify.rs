//! Status notifications for job transitions.

use tokio::sync::mpsc;

use crate::job::{JobId, JobState};

/// One job transition (or a progress line while downloading).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub name: String,
    pub state: JobState,
    pub message: String,
}

/// Receives job status updates. Called from queue tasks; must not block.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, update: StatusUpdate);
}

/// Forwards updates into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusNotifier for ChannelNotifier {
    fn notify(&self, update: StatusUpdate) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(update);
    }
}

/// Writes updates to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn notify(&self, update: StatusUpdate) {
        match update.state {
            JobState::Failed => tracing::warn!(
                job_id = %update.job_id,
                state = %update.state,
                "{}: {}",
                update.name,
                update.message
            ),
            _ => tracing::info!(
                job_id = %update.job_id,
                state = %update.state,
                "{}: {}",
                update.name,
                update.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        for state in [JobState::Queued, JobState::Downloading] {
            notifier.notify(StatusUpdate {
                job_id: JobId::new("a"),
                name: "clip".into(),
                state,
                message: String::new(),
            });
        }
        assert_eq!(rx.try_recv().unwrap().state, JobState::Queued);
        assert_eq!(rx.try_recv().unwrap().state, JobState::Downloading);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(StatusUpdate {
            job_id: JobId::new("a"),
            name: "clip".into(),
            state: JobState::Failed,
            message: "boom".into(),
        });
    }
}
