//! Execution of due lookup tasks.
//!
//! Ordering matters here: the lookup timestamp is recorded after the fetch
//! returns (it reflects when the state was observed, not when the request
//! started), the key is persisted first, and only then is the task marked
//! COMPLETED. A crash between the two writes leaves the task PENDING and
//! safely re-executable; a duplicate key row from the retry is harmless
//! because change detection only compares against the last checked baseline.

use tracing::{info, warn};

use crate::domain::entities::{Key, LookupTask, TaskStatus};
use crate::domain::errors::PipelineError;
use crate::domain::value_objects::canonical_key_list;
use crate::ports::outbound::{RawKeyFetcher, Storage, TimeSource};
use crate::service::expiry::ExpirySweep;

/// Executes lookup tasks against the key-retrieval port.
pub struct LookupExecutor<T: TimeSource> {
    time: T,
    /// The service's own registered number, recorded on each key as the
    /// lookup vantage point.
    lookup_phone: String,
    /// The origin IP recorded on each key.
    lookup_ip: String,
}

impl<T: TimeSource> LookupExecutor<T> {
    pub fn new(time: T, lookup_phone: impl Into<String>, lookup_ip: impl Into<String>) -> Self {
        Self {
            time,
            lookup_phone: lookup_phone.into(),
            lookup_ip: lookup_ip.into(),
        }
    }

    /// Executes one task: fetch, canonicalize, persist the key (UNCHECKED),
    /// then complete the task.
    ///
    /// A task whose user no longer exists is a data-state error; the row can
    /// only exist if the store lost a user, and retrying cannot help.
    pub fn perform_lookup<S: Storage, F: RawKeyFetcher>(
        &self,
        store: &mut S,
        fetcher: &F,
        task: &LookupTask,
    ) -> Result<Key, PipelineError> {
        let user = store.user(task.user_id)?.ok_or_else(|| {
            PipelineError::data_state(format!(
                "task {} references missing user {}",
                task.id, task.user_id
            ))
        })?;

        let raw_keys = fetcher.fetch(&user.phone_number)?;
        let lookup_time = self.time.now();
        let value = canonical_key_list(&raw_keys);

        let key = store.save_key(
            task,
            lookup_time,
            &self.lookup_phone,
            &self.lookup_ip,
            value,
        )?;
        store.update_task_status(task.id, TaskStatus::Completed)?;

        info!(
            task = task.id,
            user = task.user_id,
            key = key.id,
            %lookup_time,
            "lookup complete"
        );
        Ok(key)
    }

    /// Executes every currently-executable task, sequentially.
    ///
    /// The expiry sweep runs first, so overdue tasks are reclassified instead
    /// of executed. A fetch failure skips that task (it stays PENDING for the
    /// next sweep); a data-state error halts the batch.
    pub fn run<S: Storage, F: RawKeyFetcher, E: TimeSource>(
        &self,
        store: &mut S,
        fetcher: &F,
        expiry: &ExpirySweep<E>,
    ) -> Result<Vec<Key>, PipelineError> {
        let tasks = expiry.executable_tasks(store)?;

        let mut keys = Vec::new();
        for task in &tasks {
            match self.perform_lookup(store, fetcher, task) {
                Ok(key) => keys.push(key),
                Err(error) if error.is_data_state() => return Err(error),
                Err(error) => {
                    warn!(task = task.id, %error, "lookup failed, task stays pending");
                }
            }
        }

        info!(executed = keys.len(), of = tasks.len(), "lookup sweep complete");
        Ok(keys)
    }
}
