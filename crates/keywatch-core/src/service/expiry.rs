//! Reclassification of overdue pending tasks.
//!
//! Runs before any task is handed to the lookup executor, so a task that was
//! superseded by a newer scheduled task for the same user is never executed
//! late. The boundary is exclusive: a task is overdue strictly after
//! `expires`, and still active at `now == expires`.

use tracing::{debug, info};

use crate::domain::entities::{LookupTask, TaskStatus};
use crate::domain::errors::PipelineError;
use crate::ports::outbound::{Storage, TimeSource};

/// Expires overdue pending tasks and selects the executable remainder.
pub struct ExpirySweep<T: TimeSource> {
    time: T,
}

impl<T: TimeSource> ExpirySweep<T> {
    pub fn new(time: T) -> Self {
        Self { time }
    }

    /// Returns every task that is executable right now: PENDING, past
    /// `not_before`, and not past `expires`.
    ///
    /// As a side effect, every PENDING task found strictly past its expiry is
    /// persisted as EXPIRED and excluded, whether or not it ever ran.
    /// Pending tasks whose `not_before` is still in the future are left
    /// untouched and excluded.
    pub fn executable_tasks<S: Storage>(
        &self,
        store: &mut S,
    ) -> Result<Vec<LookupTask>, PipelineError> {
        let now = self.time.now();
        let pending = store.pending_tasks()?;

        let mut executable = Vec::new();
        let mut expired = 0usize;
        for task in pending {
            if task.is_overdue(now) {
                store.update_task_status(task.id, TaskStatus::Expired)?;
                debug!(task = task.id, expires = %task.expires, "task expired unexecuted");
                expired += 1;
            } else if task.is_due(now) {
                executable.push(task);
            }
        }

        if expired > 0 {
            info!(expired, "reclassified overdue tasks");
        }
        Ok(executable)
    }
}
