//! Core entities of the monitoring pipeline.
//!
//! Every entity is an immutable snapshot of a stored row; mutation happens
//! through explicit [`crate::ports::outbound::Storage`] methods, never through
//! setters. Each status enum centralizes its legal transitions in
//! `can_transition_to`, so callers cannot scatter transition rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{EmailAddress, PhoneNumber};

pub type UserId = u64;
pub type EmailId = u64;
pub type TaskId = u64;
pub type KeyId = u64;
pub type ChangeId = u64;
pub type NotificationId = u64;

/// Subscription state of a monitored account.
///
/// ```text
/// [ACTIVE] ⇄ [DEACTIVATED]
/// ```
///
/// Registration reactivates, unsubscribe deactivates. Users are never deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Deactivated,
}

impl UserStatus {
    /// Returns true if a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: UserStatus) -> bool {
        matches!(
            (self, next),
            (UserStatus::Active, UserStatus::Deactivated)
                | (UserStatus::Deactivated, UserStatus::Active)
        )
    }
}

/// A monitored account, identified by its phone number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub phone_number: PhoneNumber,
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Lifecycle of a subscriber email address.
///
/// ```text
/// [ACTIVE] ──new registration──→ [REPLACED]
/// [ACTIVE] ──unsubscribe──→ [UNSUBSCRIBED]
/// [REPLACED] ──unsubscribe──→ [UNSUBSCRIBED]
/// ```
///
/// UNSUBSCRIBED is terminal. At most one ACTIVE email exists per user; a new
/// registration with a different address demotes the prior one to REPLACED.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    Active,
    Replaced,
    Unsubscribed,
}

impl EmailStatus {
    pub fn can_transition_to(&self, next: EmailStatus) -> bool {
        matches!(
            (self, next),
            (EmailStatus::Active, EmailStatus::Replaced)
                | (EmailStatus::Active, EmailStatus::Unsubscribed)
                | (EmailStatus::Replaced, EmailStatus::Unsubscribed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EmailStatus::Unsubscribed)
    }
}

/// A notification address belonging to a user.
///
/// The unsubscribe token is the sole credential needed to deactivate the
/// subscription; it stays valid forever, even after use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub user_id: UserId,
    pub address: EmailAddress,
    pub status: EmailStatus,
    pub unsubscribe_token: String,
}

/// Lifecycle of a scheduled key lookup.
///
/// ```text
/// [PENDING] ──executed──→ [COMPLETED]
/// [PENDING] ──found past expiry──→ [EXPIRED]
/// ```
///
/// COMPLETED and EXPIRED are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Completed,
    Expired,
}

impl TaskStatus {
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Completed)
                | (TaskStatus::Pending, TaskStatus::Expired)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// One scheduled unit of work: fetch a user's key at or after `not_before`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTask {
    pub id: TaskId,
    pub user_id: UserId,
    pub not_before: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub status: TaskStatus,
}

impl LookupTask {
    /// A pending task becomes executable once `not_before` has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.not_before <= now
    }

    /// A pending task is overdue strictly after `expires`; at the boundary it
    /// is still active.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && now > self.expires
    }
}

/// Whether a fetched key has been compared against the user's baseline yet.
///
/// UNCHECKED → CHECKED happens exactly once and is never reverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    Unchecked,
    Checked,
}

impl KeyStatus {
    pub fn can_transition_to(&self, next: KeyStatus) -> bool {
        matches!((self, next), (KeyStatus::Unchecked, KeyStatus::Checked))
    }
}

/// One observed key value for a user.
///
/// `lookup_time` is recorded after the fetch returns, so it reflects when the
/// state was observed rather than when the request started. `lookup_phone` and
/// `lookup_ip` record which vantage point performed the fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: KeyId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub lookup_time: DateTime<Utc>,
    pub lookup_phone: String,
    pub lookup_ip: String,
    /// Canonical form of the fetched device keys (uppercase hex, comma-joined,
    /// fetch order preserved).
    pub value: String,
    pub status: KeyStatus,
}

/// Dispatch state of a detected key change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    New,
    Notified,
}

impl ChangeStatus {
    pub fn can_transition_to(&self, next: ChangeStatus) -> bool {
        matches!((self, next), (ChangeStatus::New, ChangeStatus::Notified))
    }
}

/// A detected difference between two consecutive checked keys of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChange {
    pub id: ChangeId,
    pub user_id: UserId,
    pub last_key_id: KeyId,
    pub new_key_id: KeyId,
    pub status: ChangeStatus,
}

/// Delivery channel of a notification. Only email exists today.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Email,
}

/// Append-only record of one notification actually sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub change_id: ChangeId,
    pub email_id: EmailId,
    pub kind: NotificationKind,
    pub sent_at: DateTime<Utc>,
}
