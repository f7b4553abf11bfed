//! Error types for the monitoring pipeline.
//!
//! The pipeline distinguishes three failure classes:
//! - data-state errors (a persisted invariant is violated): abort the current
//!   unit of work loudly, never retry;
//! - transport errors (fetch, mail, source): abort only the current batch
//!   item;
//! - validation errors (malformed input): local skip or FAIL result.
//!
//! [`PipelineError::is_data_state`] is what sweeps use to decide between
//! halting and skipping.

use thiserror::Error;

use crate::domain::entities::{ChangeId, EmailId, KeyId, TaskId, UserId};

/// Rejected input that never reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid phone number: {value}")]
    InvalidPhoneNumber { value: String },

    #[error("invalid email address: {value}")]
    InvalidEmailAddress { value: String },
}

/// A storage operation failed. All variants are data-state errors: they mean
/// the store and the caller disagree about what exists or what is legal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("no user with id {id}")]
    UserNotFound { id: UserId },

    #[error("no email with id {id}")]
    EmailNotFound { id: EmailId },

    #[error("no lookup task with id {id}")]
    TaskNotFound { id: TaskId },

    #[error("no key with id {id}")]
    KeyNotFound { id: KeyId },

    #[error("no key change with id {id}")]
    ChangeNotFound { id: ChangeId },

    #[error("user {user_id} has more than one active email")]
    MultipleActiveEmails { user_id: UserId },

    #[error("illegal {entity} transition for id {id}: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        id: u64,
        from: String,
        to: String,
    },
}

/// A key fetch against the directory failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("key lookup rejected: invalid credentials")]
    Unauthorized,

    #[error("key lookup transport failure: {message}")]
    Transport { message: String },

    #[error("key lookup returned malformed data: {message}")]
    Malformed { message: String },
}

/// An outbound mail send failed. Invalid credentials are reported distinctly
/// so operators can tell a misconfigured key from a flaky provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    #[error("failed to send email: invalid credentials")]
    InvalidCredentials,

    #[error("failed to send email (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to send email: {message}")]
    Transport { message: String },
}

/// The registration message source failed as a whole. Individual malformed
/// messages are skipped inside the source and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("failed to launch message source: {message}")]
    Launch { message: String },

    #[error("message source exited with code {code}")]
    Exit { code: i32 },

    #[error("failed to read message source output: {message}")]
    Read { message: String },
}

/// Top-level error for pipeline operations and sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// A stored row references something that no longer exists.
    #[error("data-state violation: {message}")]
    DataState { message: String },
}

impl PipelineError {
    /// Shorthand for a broken-reference data-state error.
    pub fn data_state(message: impl Into<String>) -> Self {
        PipelineError::DataState {
            message: message.into(),
        }
    }

    /// True for errors that indicate an integrity bug rather than a flaky
    /// collaborator. Sweeps halt on these and skip-and-continue on the rest.
    pub fn is_data_state(&self) -> bool {
        matches!(
            self,
            PipelineError::Storage(_) | PipelineError::DataState { .. }
        )
    }
}
