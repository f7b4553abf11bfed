//! Domain layer: entities, validated value types, and the error taxonomy.
//!
//! Pure data and rules; no I/O. Everything that touches a collaborator lives
//! behind the ports instead.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::{
    ChangeId, ChangeStatus, Email, EmailId, EmailStatus, Key, KeyChange, KeyId, KeyStatus,
    LookupTask, Notification, NotificationId, NotificationKind, TaskId, TaskStatus, User, UserId,
    UserStatus,
};
pub use errors::{
    FetchError, MailError, PipelineError, SourceError, StorageError, ValidationError,
};
pub use value_objects::{
    canonical_key_list, mint_unsubscribe_token, EmailAddress, PhoneNumber, RawKey,
    RegistrationMessage,
};
