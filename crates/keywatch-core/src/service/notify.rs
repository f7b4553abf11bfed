//! Dispatch of change notifications to subscriber addresses.
//!
//! A send failure blocks the NOTIFIED transition: the change stays NEW and
//! the next sweep retries it. Addresses that were already reached may then
//! receive a duplicate warning; the per-send Notification rows make that
//! observable.

use tracing::{info, warn};

use crate::domain::entities::{ChangeStatus, EmailStatus, Key, KeyChange, Notification};
use crate::domain::errors::PipelineError;
use crate::ports::outbound::{Mailer, Storage, TimeSource};

const SUBJECT: &str = "Warning: your identity keys have changed";

const MESSAGE_TEMPLATE: &str = "\
Hi there!

We've noticed that the keys for your phone number {phone} changed between {old} and {new}.

If you didn't get a new phone or reinstall your app during this time period, you may want to look into that.

Cheers,


Your friends at Keywatch
";

fn render_message(phone: &str, old: &Key, new: &Key) -> String {
    MESSAGE_TEMPLATE
        .replace("{phone}", phone)
        .replace("{old}", &old.lookup_time.to_rfc3339())
        .replace("{new}", &new.lookup_time.to_rfc3339())
}

/// Emails every active subscriber address for each new key change.
pub struct Notifier<T: TimeSource> {
    time: T,
}

impl<T: TimeSource> Notifier<T> {
    pub fn new(time: T) -> Self {
        Self { time }
    }

    /// Notifies every currently-ACTIVE email of the change's user, recording
    /// one Notification per send, then marks the change NOTIFIED.
    ///
    /// A change referencing a missing user or key is a data-state error. A
    /// send failure aborts before the NOTIFIED transition so the change is
    /// retried by the next sweep.
    pub fn notify<S: Storage, M: Mailer>(
        &self,
        store: &mut S,
        mailer: &M,
        change: &KeyChange,
    ) -> Result<Vec<Notification>, PipelineError> {
        let user = store.user(change.user_id)?.ok_or_else(|| {
            PipelineError::data_state(format!(
                "change {} references missing user {}",
                change.id, change.user_id
            ))
        })?;
        let old_key = store.key(change.last_key_id)?.ok_or_else(|| {
            PipelineError::data_state(format!(
                "change {} references missing key {}",
                change.id, change.last_key_id
            ))
        })?;
        let new_key = store.key(change.new_key_id)?.ok_or_else(|| {
            PipelineError::data_state(format!(
                "change {} references missing key {}",
                change.id, change.new_key_id
            ))
        })?;

        let message = render_message(user.phone_number.as_str(), &old_key, &new_key);

        let recipients: Vec<_> = store
            .emails_for_user(change.user_id)?
            .into_iter()
            .filter(|email| email.status == EmailStatus::Active)
            .collect();

        let mut notifications = Vec::with_capacity(recipients.len());
        for email in &recipients {
            mailer.send(&email.address, SUBJECT, &message)?;

            let sent_at = self.time.now();
            let notification =
                store.save_notification(change.user_id, change.id, email.id, sent_at)?;
            info!(
                change = change.id,
                email = email.id,
                %sent_at,
                "notification sent"
            );
            notifications.push(notification);
        }

        store.update_change_status(change.id, ChangeStatus::Notified)?;
        Ok(notifications)
    }

    /// Processes every change still awaiting notification.
    ///
    /// Mail transport failures skip the change (it stays NEW); data-state
    /// errors halt the sweep.
    pub fn run<S: Storage, M: Mailer>(
        &self,
        store: &mut S,
        mailer: &M,
    ) -> Result<Vec<Notification>, PipelineError> {
        let changes = store.new_changes()?;

        let mut notifications = Vec::new();
        for change in &changes {
            match self.notify(store, mailer, change) {
                Ok(sent) => notifications.extend(sent),
                Err(error) if error.is_data_state() => return Err(error),
                Err(error) => {
                    warn!(change = change.id, %error, "notification failed, change stays new");
                }
            }
        }

        info!(
            changes = changes.len(),
            sent = notifications.len(),
            "notification sweep complete"
        );
        Ok(notifications)
    }
}
