//! Outbound (driven) ports for the monitoring pipeline.
//!
//! These traits define what the pipeline needs from the outside world:
//! persistence, key retrieval, outbound mail, the registration message
//! source, and a clock. Services are generic over them; production adapters
//! live in the runtime crate, test doubles in [`crate::adapters::mock`].

use chrono::{DateTime, Utc};

use crate::domain::entities::{
    ChangeId, ChangeStatus, Email, EmailId, EmailStatus, Key, KeyChange, KeyId, KeyStatus,
    LookupTask, Notification, TaskId, TaskStatus, User, UserId, UserStatus,
};
use crate::domain::errors::{FetchError, MailError, SourceError, StorageError};
use crate::domain::value_objects::{EmailAddress, PhoneNumber, RawKey, RegistrationMessage};

/// Persistence API over the six entity tables.
///
/// Entities are immutable snapshots; every mutation is an explicit method
/// that returns the updated row. Status updates enforce each entity's legal
/// transitions and fail with [`StorageError::IllegalTransition`] otherwise.
///
/// Lookups by id return `Ok(None)` for absent rows; it is the caller's job to
/// decide whether absence is a data-state violation. Updates to absent rows
/// are always errors.
pub trait Storage: Send {
    // --- users ---

    fn create_user(&mut self, phone_number: PhoneNumber) -> Result<User, StorageError>;

    fn user(&self, id: UserId) -> Result<Option<User>, StorageError>;

    fn user_by_phone(&self, phone_number: &PhoneNumber) -> Result<Option<User>, StorageError>;

    /// All users whose status is ACTIVE, in id order.
    fn active_users(&self) -> Result<Vec<User>, StorageError>;

    fn update_user_status(&mut self, id: UserId, status: UserStatus) -> Result<User, StorageError>;

    // --- emails ---

    fn add_email(
        &mut self,
        user_id: UserId,
        address: EmailAddress,
        unsubscribe_token: String,
    ) -> Result<Email, StorageError>;

    /// Every email ever attached to the user, in id order.
    fn emails_for_user(&self, user_id: UserId) -> Result<Vec<Email>, StorageError>;

    /// The user's single ACTIVE email, if any.
    ///
    /// More than one ACTIVE row violates the one-active-address invariant and
    /// is reported as [`StorageError::MultipleActiveEmails`].
    fn active_email(&self, user_id: UserId) -> Result<Option<Email>, StorageError>;

    /// Exact-match lookup by unsubscribe token, the only way in from the
    /// unsubscribe side channel.
    fn email_by_token(&self, token: &str) -> Result<Option<Email>, StorageError>;

    fn update_email_status(
        &mut self,
        id: EmailId,
        status: EmailStatus,
    ) -> Result<Email, StorageError>;

    // --- lookup tasks ---

    fn create_task(
        &mut self,
        user_id: UserId,
        not_before: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Result<LookupTask, StorageError>;

    /// All tasks still PENDING, in id order, regardless of due time.
    fn pending_tasks(&self) -> Result<Vec<LookupTask>, StorageError>;

    fn update_task_status(
        &mut self,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<LookupTask, StorageError>;

    // --- keys ---

    /// Persists a fetched key for the task's user, status UNCHECKED.
    fn save_key(
        &mut self,
        task: &LookupTask,
        lookup_time: DateTime<Utc>,
        lookup_phone: &str,
        lookup_ip: &str,
        value: String,
    ) -> Result<Key, StorageError>;

    fn key(&self, id: KeyId) -> Result<Option<Key>, StorageError>;

    fn keys_with_status(&self, status: KeyStatus) -> Result<Vec<Key>, StorageError>;

    /// The most recently stored CHECKED key for the user: the baseline the
    /// next fetched value is compared against.
    fn last_checked_key(&self, user_id: UserId) -> Result<Option<Key>, StorageError>;

    fn update_key_status(&mut self, id: KeyId, status: KeyStatus) -> Result<Key, StorageError>;

    // --- key changes ---

    fn save_change(
        &mut self,
        user_id: UserId,
        last_key_id: KeyId,
        new_key_id: KeyId,
    ) -> Result<KeyChange, StorageError>;

    /// All changes still awaiting notification, in id order.
    fn new_changes(&self) -> Result<Vec<KeyChange>, StorageError>;

    fn update_change_status(
        &mut self,
        id: ChangeId,
        status: ChangeStatus,
    ) -> Result<KeyChange, StorageError>;

    // --- notifications ---

    fn save_notification(
        &mut self,
        user_id: UserId,
        change_id: ChangeId,
        email_id: EmailId,
        sent_at: DateTime<Utc>,
    ) -> Result<Notification, StorageError>;

    fn notifications_for_change(
        &self,
        change_id: ChangeId,
    ) -> Result<Vec<Notification>, StorageError>;
}

/// Key-retrieval capability against the monitored network.
///
/// Returns the raw per-device keys for a phone number in the order the
/// protocol produced them; canonicalization is order-sensitive.
pub trait RawKeyFetcher: Send {
    fn fetch(&self, phone_number: &PhoneNumber) -> Result<Vec<RawKey>, FetchError>;
}

/// Outbound email capability.
pub trait Mailer: Send {
    fn send(&self, to: &EmailAddress, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Produces one finite batch of registration messages per poll.
///
/// Malformed entries are skipped (with a warning) inside the source and never
/// fail the batch; only a whole-source failure surfaces as an error.
pub trait MessageSource: Send {
    fn poll(&mut self) -> Result<Vec<RegistrationMessage>, SourceError>;
}

/// Clock abstraction so schedule and expiry logic is testable with
/// deterministic time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
