//! Detection of key changes against the last checked baseline.

use tracing::{debug, info};

use crate::domain::entities::{Key, KeyChange, KeyStatus};
use crate::domain::errors::PipelineError;
use crate::ports::outbound::Storage;

/// Returns true if the canonical value changed from one key to the next.
fn key_changed(old: &Key, new: &Key) -> bool {
    old.value != new.value
}

/// Compares unchecked keys against each user's baseline and records changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Checks one key against the user's most recent CHECKED key.
    ///
    /// With no baseline this is the first observation and no change is
    /// possible. On a value mismatch a NEW KeyChange is persisted referencing
    /// both keys. On every path the key ends CHECKED, exactly once, at the
    /// end.
    pub fn check_for_changes<S: Storage>(
        &self,
        store: &mut S,
        key: &Key,
    ) -> Result<Option<KeyChange>, PipelineError> {
        debug!(key = key.id, user = key.user_id, "checking key for changes");

        let baseline = store.last_checked_key(key.user_id)?;

        let change = match baseline {
            None => {
                debug!(user = key.user_id, "no baseline, first observation");
                None
            }
            Some(ref old) if key_changed(old, key) => {
                let change = store.save_change(key.user_id, old.id, key.id)?;
                info!(
                    change = change.id,
                    user = key.user_id,
                    last_key = old.id,
                    new_key = key.id,
                    "key change detected"
                );
                Some(change)
            }
            Some(_) => None,
        };

        store.update_key_status(key.id, KeyStatus::Checked)?;
        Ok(change)
    }

    /// Checks every UNCHECKED key. Order is irrelevant; the status filter
    /// keeps already-checked keys out of the batch.
    ///
    /// Every error here is a data-state error (the detector does no network
    /// I/O), so the sweep halts on the first failure.
    pub fn run<S: Storage>(&self, store: &mut S) -> Result<Vec<KeyChange>, PipelineError> {
        let unchecked = store.keys_with_status(KeyStatus::Unchecked)?;

        let mut changes = Vec::new();
        for key in &unchecked {
            if let Some(change) = self.check_for_changes(store, key)? {
                changes.push(change);
            }
        }

        info!(
            checked = unchecked.len(),
            changes = changes.len(),
            "change detection sweep complete"
        );
        Ok(changes)
    }
}
