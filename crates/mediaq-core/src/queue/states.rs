//! Current lifecycle state of every job the queue has seen.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::job::{JobId, JobState};

/// States are recorded before the matching notification goes out, so a
/// caller reacting to an update never reads an older state.
#[derive(Default)]
pub(super) struct StateBoard {
    states: Mutex<HashMap<JobId, JobState>>,
}

impl StateBoard {
    pub(super) fn get(&self, id: &JobId) -> Option<JobState> {
        self.lock().get(id).copied()
    }

    pub(super) fn queued(&self, id: &JobId) {
        self.lock().insert(id.clone(), JobState::Queued);
    }

    /// Move a job forward along a legal transition. Repeating the current
    /// state is accepted; anything else is refused and logged.
    pub(super) fn advance(&self, id: &JobId, next: JobState) -> bool {
        let mut states = self.lock();
        let Some(current) = states.get_mut(id) else {
            return false;
        };
        if *current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            tracing::debug!(job_id = %id, from = %current, to = %next, "illegal state transition ignored");
            return false;
        }
        *current = next;
        true
    }

    /// Record a terminal state. Always wins over whatever was recorded.
    pub(super) fn finish(&self, id: &JobId, state: JobState) {
        debug_assert!(state.is_terminal());
        self.lock().insert(id.clone(), state);
    }

    pub(super) fn is_finished(&self, id: &JobId) -> bool {
        self.get(id).is_some_and(JobState::is_terminal)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, JobState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
