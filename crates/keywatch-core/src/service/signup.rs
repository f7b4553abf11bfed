//! Registration processing: inbound (phone, email) messages become users,
//! subscriber addresses, an immediate lookup task, and a welcome email.

use chrono::Duration;
use tracing::{info, warn};

use crate::domain::entities::{Email, EmailStatus, UserStatus};
use crate::domain::errors::PipelineError;
use crate::domain::value_objects::{mint_unsubscribe_token, RegistrationMessage};
use crate::ports::outbound::{Mailer, MessageSource, Storage, TimeSource};
use crate::service::scheduler::InvalidFrequency;

const WELCOME_SUBJECT: &str = "Welcome to Keywatch";

const WELCOME_TEMPLATE: &str = "\
Hi there!

We're now watching the identity keys for your phone number {phone}. You'll get an email at this address whenever they change unexpectedly.

If you'd rather we didn't, you can unsubscribe at any time:

{link}

Cheers,


Your friends at Keywatch
";

/// The result of processing one registration message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub email: Email,
    /// False for an idempotent re-signup of an unchanged (phone, address)
    /// pair: no new row, no task, no welcome mail.
    pub created: bool,
}

/// Turns registration messages into users and subscriptions.
pub struct SignupProcessor<T: TimeSource> {
    time: T,
    frequency_minutes: u32,
    unsubscribe_base_url: String,
}

impl<T: TimeSource> SignupProcessor<T> {
    pub fn new(
        time: T,
        frequency_minutes: u32,
        unsubscribe_base_url: impl Into<String>,
    ) -> Result<Self, InvalidFrequency> {
        if frequency_minutes < 2 {
            return Err(InvalidFrequency {
                minutes: frequency_minutes,
            });
        }
        Ok(Self {
            time,
            frequency_minutes,
            unsubscribe_base_url: unsubscribe_base_url.into(),
        })
    }

    fn unsubscribe_link(&self, token: &str) -> String {
        format!("{}?t={}", self.unsubscribe_base_url, token)
    }

    /// Reconciles one registration against the stored state.
    ///
    /// The user is created on first contact and reactivated if deactivated.
    /// An unchanged (phone, address) pair returns the existing row; a
    /// differing prior ACTIVE address is demoted to REPLACED before the new
    /// one is added with a freshly minted unsubscribe token.
    pub fn process_registration<S: Storage>(
        &self,
        store: &mut S,
        message: &RegistrationMessage,
    ) -> Result<RegistrationOutcome, PipelineError> {
        let user = match store.user_by_phone(&message.phone_number)? {
            Some(user) if user.is_active() => user,
            Some(user) => {
                info!(user = user.id, "reactivating user on re-registration");
                store.update_user_status(user.id, UserStatus::Active)?
            }
            None => {
                let user = store.create_user(message.phone_number.clone())?;
                info!(user = user.id, phone = %user.phone_number, "new user registered");
                user
            }
        };

        if let Some(existing) = store.active_email(user.id)? {
            if existing.address == message.email {
                return Ok(RegistrationOutcome {
                    email: existing,
                    created: false,
                });
            }
            info!(email = existing.id, "replacing prior active email");
            store.update_email_status(existing.id, EmailStatus::Replaced)?;
        }

        let token = mint_unsubscribe_token(self.time.now());
        let email = store.add_email(user.id, message.email.clone(), token)?;
        info!(user = user.id, email = email.id, "subscriber email added");

        Ok(RegistrationOutcome {
            email,
            created: true,
        })
    }

    /// Processes one message end to end: reconcile, then (for a newly created
    /// subscription) schedule an immediate lookup and send the welcome email.
    pub fn register<S: Storage, M: Mailer>(
        &self,
        store: &mut S,
        mailer: &M,
        message: &RegistrationMessage,
    ) -> Result<RegistrationOutcome, PipelineError> {
        let outcome = self.process_registration(store, message)?;
        if !outcome.created {
            return Ok(outcome);
        }

        let now = self.time.now();
        let expires = now + Duration::minutes(i64::from(self.frequency_minutes));
        let task = store.create_task(outcome.email.user_id, now, expires)?;
        info!(task = task.id, user = task.user_id, "immediate lookup scheduled");

        let link = self.unsubscribe_link(&outcome.email.unsubscribe_token);
        let body = WELCOME_TEMPLATE
            .replace("{phone}", message.phone_number.as_str())
            .replace("{link}", &link);
        mailer.send(&outcome.email.address, WELCOME_SUBJECT, &body)?;

        Ok(outcome)
    }

    /// Polls the message source once and registers every message in the
    /// batch.
    ///
    /// A whole-source failure propagates; per-message transport failures
    /// (welcome mail) skip that message; data-state errors halt the batch.
    pub fn run<S: Storage, M: Mailer, R: MessageSource>(
        &self,
        store: &mut S,
        mailer: &M,
        source: &mut R,
    ) -> Result<Vec<RegistrationOutcome>, PipelineError> {
        let messages = source.poll()?;

        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            match self.register(store, mailer, message) {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) if error.is_data_state() => return Err(error),
                Err(error) => {
                    warn!(phone = %message.phone_number, %error, "registration skipped");
                }
            }
        }

        info!(
            received = messages.len(),
            processed = outcomes.len(),
            "signup sweep complete"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::adapters::memory::MemoryStore;
    use crate::adapters::mock::{MockMailer, MockMessageSource, MockTimeSource};
    use crate::domain::errors::MailError;
    use crate::domain::value_objects::{EmailAddress, PhoneNumber};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(phone: &str, email: &str) -> RegistrationMessage {
        RegistrationMessage {
            phone_number: PhoneNumber::new(phone).unwrap(),
            email: EmailAddress::new(email).unwrap(),
        }
    }

    fn processor(now: DateTime<Utc>) -> SignupProcessor<MockTimeSource> {
        SignupProcessor::new(MockTimeSource::new(now), 60, "http://example.com/").unwrap()
    }

    #[test]
    fn test_rejects_frequency_below_two_minutes() {
        assert!(SignupProcessor::new(MockTimeSource::new(ts(0)), 1, "http://x.com/").is_err());
    }

    #[test]
    fn test_new_registration_creates_user_and_active_email() {
        let mut store = MemoryStore::new();
        let outcome = processor(ts(1000))
            .process_registration(&mut store, &message("+15555550100", "a@example.com"))
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.email.status, EmailStatus::Active);
        assert!(!outcome.email.unsubscribe_token.is_empty());

        let user = store.user(outcome.email.user_id).unwrap().unwrap();
        assert!(user.is_active());
        assert_eq!(user.phone_number.as_str(), "+15555550100");
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let mut store = MemoryStore::new();
        let processor = processor(ts(1000));
        let msg = message("+15555550100", "a@example.com");

        let first = processor.process_registration(&mut store, &msg).unwrap();
        let second = processor.process_registration(&mut store, &msg).unwrap();

        assert!(!second.created);
        assert_eq!(second.email, first.email);
        assert_eq!(store.emails_for_user(first.email.user_id).unwrap().len(), 1);
    }

    #[test]
    fn test_new_address_replaces_the_prior_active_one() {
        let mut store = MemoryStore::new();
        let processor = processor(ts(1000));

        let first = processor
            .process_registration(&mut store, &message("+15555550100", "a@example.com"))
            .unwrap();
        let second = processor
            .process_registration(&mut store, &message("+15555550100", "b@example.com"))
            .unwrap();

        assert!(second.created);
        assert_ne!(second.email.unsubscribe_token, first.email.unsubscribe_token);

        let emails = store.emails_for_user(first.email.user_id).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].status, EmailStatus::Replaced);
        assert_eq!(emails[1].status, EmailStatus::Active);

        // Exactly one active address afterwards.
        let active = store.active_email(first.email.user_id).unwrap().unwrap();
        assert_eq!(active.address.as_str(), "b@example.com");
    }

    #[test]
    fn test_registration_reactivates_a_deactivated_user() {
        let mut store = MemoryStore::new();
        let processor = processor(ts(1000));
        let msg = message("+15555550100", "a@example.com");

        let outcome = processor.process_registration(&mut store, &msg).unwrap();
        store
            .update_user_status(outcome.email.user_id, UserStatus::Deactivated)
            .unwrap();

        processor.process_registration(&mut store, &msg).unwrap();
        let user = store.user(outcome.email.user_id).unwrap().unwrap();
        assert!(user.is_active());
    }

    #[test]
    fn test_register_schedules_immediate_task_and_sends_welcome() {
        let mut store = MemoryStore::new();
        let mailer = MockMailer::new();
        let now = ts(1000);

        let outcome = processor(now)
            .register(&mut store, &mailer, &message("+15555550100", "a@example.com"))
            .unwrap();

        let tasks = store.pending_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].not_before, now);
        assert_eq!(tasks[0].expires, now + Duration::minutes(60));

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].subject, WELCOME_SUBJECT);
        assert!(sent[0].body.contains("+15555550100"));
        assert!(sent[0].body.contains(&format!(
            "http://example.com/?t={}",
            outcome.email.unsubscribe_token
        )));
    }

    #[test]
    fn test_idempotent_resignup_sends_no_welcome_and_no_task() {
        let mut store = MemoryStore::new();
        let mailer = MockMailer::new();
        let processor = processor(ts(1000));
        let msg = message("+15555550100", "a@example.com");

        processor.register(&mut store, &mailer, &msg).unwrap();
        processor.register(&mut store, &mailer, &msg).unwrap();

        assert_eq!(store.pending_tasks().unwrap().len(), 1);
        assert_eq!(mailer.sent_count(), 1);
    }

    #[test]
    fn test_run_continues_past_a_welcome_mail_failure() {
        let mut store = MemoryStore::new();
        let mailer = MockMailer::new().with_failure(MailError::Transport {
            message: "socket closed".into(),
        });
        let mut source = MockMessageSource::new().with_batch(vec![
            message("+15555550100", "a@example.com"),
            message("+15555550101", "b@example.com"),
        ]);

        let outcomes = processor(ts(1000))
            .run(&mut store, &mailer, &mut source)
            .unwrap();

        // The first welcome failed but its registration stands; the second
        // went through end to end.
        assert_eq!(outcomes.len(), 1);
        assert_eq!(mailer.sent_count(), 1);
        assert!(store
            .user_by_phone(&PhoneNumber::new("+15555550100").unwrap())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_run_propagates_source_failure() {
        let mut store = MemoryStore::new();
        let mailer = MockMailer::new();
        let mut source = MockMessageSource::new().with_failure(
            crate::domain::errors::SourceError::Exit { code: 1 },
        );

        let result = processor(ts(1000)).run(&mut store, &mailer, &mut source);
        assert!(result.is_err());
    }
}
