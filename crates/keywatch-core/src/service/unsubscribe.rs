//! Unsubscribe processing: an opaque token deactivates the whole account.

use tracing::info;

use crate::domain::entities::{EmailStatus, UserStatus};
use crate::domain::errors::StorageError;
use crate::ports::outbound::Storage;

/// Application-level outcome of an unsubscribe request. Distinct from a
/// storage error, which the caller maps to an internal failure instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnsubscribeResult {
    Success,
    Fail,
}

/// Deactivates the email and its user, given the email's unsubscribe token.
///
/// An unknown token is a FAIL, not an error. The operation is idempotent:
/// tokens are never purged, and repeating a successful unsubscribe returns
/// SUCCESS again without further mutation.
pub fn process_unsubscribe<S: Storage>(
    store: &mut S,
    token: &str,
) -> Result<UnsubscribeResult, StorageError> {
    let Some(email) = store.email_by_token(token)? else {
        return Ok(UnsubscribeResult::Fail);
    };

    if email.status != EmailStatus::Unsubscribed {
        store.update_email_status(email.id, EmailStatus::Unsubscribed)?;
    }

    let user = store
        .user(email.user_id)?
        .ok_or(StorageError::UserNotFound { id: email.user_id })?;
    if user.status != UserStatus::Deactivated {
        store.update_user_status(user.id, UserStatus::Deactivated)?;
    }

    info!(email = email.id, user = email.user_id, "unsubscribed");
    Ok(UnsubscribeResult::Success)
}
