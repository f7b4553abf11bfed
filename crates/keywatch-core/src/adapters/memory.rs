//! In-memory storage adapter.
//!
//! Backs every test in the workspace and, wrapped in the runtime's snapshot
//! file, the deployed service as well. Tables are `BTreeMap`s keyed by id so
//! iteration order is the insert order and snapshots serialize
//! deterministically. Ids are sequential per table, starting at 1.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{
    ChangeId, ChangeStatus, Email, EmailId, EmailStatus, Key, KeyChange, KeyId, KeyStatus,
    LookupTask, Notification, NotificationId, NotificationKind, TaskId, TaskStatus, User, UserId,
    UserStatus,
};
use crate::domain::errors::StorageError;
use crate::domain::value_objects::{EmailAddress, PhoneNumber};
use crate::ports::outbound::Storage;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct IdCounters {
    user: u64,
    email: u64,
    task: u64,
    key: u64,
    change: u64,
    notification: u64,
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

/// Storage implementation holding all six tables in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    users: BTreeMap<UserId, User>,
    emails: BTreeMap<EmailId, Email>,
    tasks: BTreeMap<TaskId, LookupTask>,
    keys: BTreeMap<KeyId, Key>,
    changes: BTreeMap<ChangeId, KeyChange>,
    notifications: BTreeMap<NotificationId, Notification>,
    counters: IdCounters,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn create_user(&mut self, phone_number: PhoneNumber) -> Result<User, StorageError> {
        let id = next_id(&mut self.counters.user);
        let user = User {
            id,
            phone_number,
            status: UserStatus::Active,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        Ok(self.users.get(&id).cloned())
    }

    fn user_by_phone(&self, phone_number: &PhoneNumber) -> Result<Option<User>, StorageError> {
        Ok(self
            .users
            .values()
            .find(|user| &user.phone_number == phone_number)
            .cloned())
    }

    fn active_users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self
            .users
            .values()
            .filter(|user| user.is_active())
            .cloned()
            .collect())
    }

    fn update_user_status(&mut self, id: UserId, status: UserStatus) -> Result<User, StorageError> {
        let user = self
            .users
            .get_mut(&id)
            .ok_or(StorageError::UserNotFound { id })?;
        if !user.status.can_transition_to(status) {
            return Err(StorageError::IllegalTransition {
                entity: "user",
                id,
                from: format!("{:?}", user.status),
                to: format!("{status:?}"),
            });
        }
        user.status = status;
        Ok(user.clone())
    }

    fn add_email(
        &mut self,
        user_id: UserId,
        address: EmailAddress,
        unsubscribe_token: String,
    ) -> Result<Email, StorageError> {
        let id = next_id(&mut self.counters.email);
        let email = Email {
            id,
            user_id,
            address,
            status: EmailStatus::Active,
            unsubscribe_token,
        };
        self.emails.insert(id, email.clone());
        Ok(email)
    }

    fn emails_for_user(&self, user_id: UserId) -> Result<Vec<Email>, StorageError> {
        Ok(self
            .emails
            .values()
            .filter(|email| email.user_id == user_id)
            .cloned()
            .collect())
    }

    fn active_email(&self, user_id: UserId) -> Result<Option<Email>, StorageError> {
        let mut active = self
            .emails
            .values()
            .filter(|email| email.user_id == user_id && email.status == EmailStatus::Active);

        let first = active.next().cloned();
        if first.is_some() && active.next().is_some() {
            return Err(StorageError::MultipleActiveEmails { user_id });
        }
        Ok(first)
    }

    fn email_by_token(&self, token: &str) -> Result<Option<Email>, StorageError> {
        Ok(self
            .emails
            .values()
            .find(|email| email.unsubscribe_token == token)
            .cloned())
    }

    fn update_email_status(
        &mut self,
        id: EmailId,
        status: EmailStatus,
    ) -> Result<Email, StorageError> {
        let email = self
            .emails
            .get_mut(&id)
            .ok_or(StorageError::EmailNotFound { id })?;
        if !email.status.can_transition_to(status) {
            return Err(StorageError::IllegalTransition {
                entity: "email",
                id,
                from: format!("{:?}", email.status),
                to: format!("{status:?}"),
            });
        }
        email.status = status;
        Ok(email.clone())
    }

    fn create_task(
        &mut self,
        user_id: UserId,
        not_before: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Result<LookupTask, StorageError> {
        let id = next_id(&mut self.counters.task);
        let task = LookupTask {
            id,
            user_id,
            not_before,
            expires,
            status: TaskStatus::Pending,
        };
        self.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn pending_tasks(&self) -> Result<Vec<LookupTask>, StorageError> {
        Ok(self
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .cloned()
            .collect())
    }

    fn update_task_status(
        &mut self,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<LookupTask, StorageError> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(StorageError::TaskNotFound { id })?;
        if !task.status.can_transition_to(status) {
            return Err(StorageError::IllegalTransition {
                entity: "lookup task",
                id,
                from: format!("{:?}", task.status),
                to: format!("{status:?}"),
            });
        }
        task.status = status;
        Ok(task.clone())
    }

    fn save_key(
        &mut self,
        task: &LookupTask,
        lookup_time: DateTime<Utc>,
        lookup_phone: &str,
        lookup_ip: &str,
        value: String,
    ) -> Result<Key, StorageError> {
        let id = next_id(&mut self.counters.key);
        let key = Key {
            id,
            task_id: task.id,
            user_id: task.user_id,
            lookup_time,
            lookup_phone: lookup_phone.to_owned(),
            lookup_ip: lookup_ip.to_owned(),
            value,
            status: KeyStatus::Unchecked,
        };
        self.keys.insert(id, key.clone());
        Ok(key)
    }

    fn key(&self, id: KeyId) -> Result<Option<Key>, StorageError> {
        Ok(self.keys.get(&id).cloned())
    }

    fn keys_with_status(&self, status: KeyStatus) -> Result<Vec<Key>, StorageError> {
        Ok(self
            .keys
            .values()
            .filter(|key| key.status == status)
            .cloned()
            .collect())
    }

    fn last_checked_key(&self, user_id: UserId) -> Result<Option<Key>, StorageError> {
        Ok(self
            .keys
            .values()
            .filter(|key| key.user_id == user_id && key.status == KeyStatus::Checked)
            .last()
            .cloned())
    }

    fn update_key_status(&mut self, id: KeyId, status: KeyStatus) -> Result<Key, StorageError> {
        let key = self
            .keys
            .get_mut(&id)
            .ok_or(StorageError::KeyNotFound { id })?;
        if !key.status.can_transition_to(status) {
            return Err(StorageError::IllegalTransition {
                entity: "key",
                id,
                from: format!("{:?}", key.status),
                to: format!("{status:?}"),
            });
        }
        key.status = status;
        Ok(key.clone())
    }

    fn save_change(
        &mut self,
        user_id: UserId,
        last_key_id: KeyId,
        new_key_id: KeyId,
    ) -> Result<KeyChange, StorageError> {
        let id = next_id(&mut self.counters.change);
        let change = KeyChange {
            id,
            user_id,
            last_key_id,
            new_key_id,
            status: ChangeStatus::New,
        };
        self.changes.insert(id, change.clone());
        Ok(change)
    }

    fn new_changes(&self) -> Result<Vec<KeyChange>, StorageError> {
        Ok(self
            .changes
            .values()
            .filter(|change| change.status == ChangeStatus::New)
            .cloned()
            .collect())
    }

    fn update_change_status(
        &mut self,
        id: ChangeId,
        status: ChangeStatus,
    ) -> Result<KeyChange, StorageError> {
        let change = self
            .changes
            .get_mut(&id)
            .ok_or(StorageError::ChangeNotFound { id })?;
        if !change.status.can_transition_to(status) {
            return Err(StorageError::IllegalTransition {
                entity: "key change",
                id,
                from: format!("{:?}", change.status),
                to: format!("{status:?}"),
            });
        }
        change.status = status;
        Ok(change.clone())
    }

    fn save_notification(
        &mut self,
        user_id: UserId,
        change_id: ChangeId,
        email_id: EmailId,
        sent_at: DateTime<Utc>,
    ) -> Result<Notification, StorageError> {
        let id = next_id(&mut self.counters.notification);
        let notification = Notification {
            id,
            user_id,
            change_id,
            email_id,
            kind: NotificationKind::Email,
            sent_at,
        };
        self.notifications.insert(id, notification.clone());
        Ok(notification)
    }

    fn notifications_for_change(
        &self,
        change_id: ChangeId,
    ) -> Result<Vec<Notification>, StorageError> {
        Ok(self
            .notifications
            .values()
            .filter(|notification| notification.change_id == change_id)
            .cloned()
            .collect())
    }
}
