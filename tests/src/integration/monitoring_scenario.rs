//! The full monitoring pipeline, end to end: registration, first lookup,
//! baseline, detected change, notification, unsubscribe.

use chrono::{DateTime, TimeZone, Utc};

use keywatch_core::adapters::memory::MemoryStore;
use keywatch_core::adapters::mock::{MockKeyFetcher, MockMailer, MockTimeSource};
use keywatch_core::domain::entities::{ChangeStatus, EmailStatus, KeyStatus, UserStatus};
use keywatch_core::domain::value_objects::{EmailAddress, PhoneNumber, RawKey, RegistrationMessage};
use keywatch_core::ports::outbound::Storage;
use keywatch_core::service::unsubscribe::{process_unsubscribe, UnsubscribeResult};
use keywatch_core::service::{
    ChangeDetector, ExpirySweep, LookupExecutor, Notifier, Scheduler, SignupProcessor,
};

const FREQUENCY_MINUTES: u32 = 60;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn registration(phone: &str, email: &str) -> RegistrationMessage {
    RegistrationMessage {
        phone_number: PhoneNumber::new(phone).unwrap(),
        email: EmailAddress::new(email).unwrap(),
    }
}

#[test]
fn test_pipeline_from_registration_to_unsubscribe() {
    let mut store = MemoryStore::new();
    let clock = MockTimeSource::new(ts(1_000_000));
    let mailer = MockMailer::new();

    let signup = SignupProcessor::new(
        MockTimeSource::new(ts(1_000_000)),
        FREQUENCY_MINUTES,
        "http://keywatch.example.com/",
    )
    .unwrap();
    let executor = LookupExecutor::new(
        MockTimeSource::new(ts(1_000_000)),
        "+15555559999",
        "203.0.113.7",
    );
    let detector = ChangeDetector::new();
    let notifier = Notifier::new(MockTimeSource::new(ts(1_000_000)));

    // --- Registration: user, active email, welcome mail, immediate task ---
    let outcome = signup
        .register(
            &mut store,
            &mailer,
            &registration("+15555550100", "a@example.com"),
        )
        .unwrap();
    assert!(outcome.created);
    let token = outcome.email.unsubscribe_token.clone();
    let user_id = outcome.email.user_id;

    assert_eq!(mailer.sent_count(), 1);
    assert_eq!(mailer.sent()[0].subject, "Welcome to Keywatch");
    assert!(mailer.sent()[0]
        .body
        .contains(&format!("http://keywatch.example.com/?t={token}")));

    let tasks = store.pending_tasks().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].not_before, ts(1_000_000));

    // --- First lookup: K1 = "AA", unchecked ---
    let fetcher = MockKeyFetcher::new().with_keys(vec![RawKey::new(vec![0xAA])]);
    let expiry = ExpirySweep::new(MockTimeSource::new(ts(1_000_000)));
    let keys = executor.run(&mut store, &fetcher, &expiry).unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].value, "AA");
    assert!(store.pending_tasks().unwrap().is_empty());

    // --- First check: no baseline, no change, K1 becomes the baseline ---
    let changes = detector.run(&mut store).unwrap();
    assert!(changes.is_empty());
    assert_eq!(
        store.key(keys[0].id).unwrap().unwrap().status,
        KeyStatus::Checked
    );

    // --- Next interval: scheduled lookup fetches K2 = "BB" ---
    clock.advance_minutes(i64::from(FREQUENCY_MINUTES));
    let scheduler = Scheduler::new(
        MockTimeSource::new(clock_now(&clock)),
        FREQUENCY_MINUTES,
    )
    .unwrap();
    let scheduled = scheduler.run(&mut store).unwrap();
    assert_eq!(scheduled.len(), 1);

    // Jump past the jittered not_before so the task is due.
    let due_time = scheduled[0].not_before;
    let fetcher = MockKeyFetcher::new().with_keys(vec![RawKey::new(vec![0xBB])]);
    let expiry = ExpirySweep::new(MockTimeSource::new(due_time));
    let late_executor = LookupExecutor::new(
        MockTimeSource::new(due_time),
        "+15555559999",
        "203.0.113.7",
    );
    let keys = late_executor.run(&mut store, &fetcher, &expiry).unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].value, "BB");

    // --- Second check: AA != BB, one NEW change with correct endpoints ---
    let changes = detector.run(&mut store).unwrap();
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.user_id, user_id);
    assert_eq!(change.status, ChangeStatus::New);
    let old_key = store.key(change.last_key_id).unwrap().unwrap();
    let new_key = store.key(change.new_key_id).unwrap().unwrap();
    assert_eq!(old_key.value, "AA");
    assert_eq!(new_key.value, "BB");

    // --- Notification: one email, one row, change closed ---
    let sent = notifier.run(&mut store, &mailer).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email_id, outcome.email.id);
    assert_eq!(mailer.sent_count(), 2);
    let warning = &mailer.sent()[1];
    assert_eq!(warning.to, "a@example.com");
    assert_eq!(warning.subject, "Warning: your identity keys have changed");
    assert!(warning.body.contains("+15555550100"));
    assert!(store.new_changes().unwrap().is_empty());
    assert_eq!(store.notifications_for_change(change.id).unwrap().len(), 1);

    // --- Unsubscribe: account fully deactivated, token stays valid ---
    assert_eq!(
        process_unsubscribe(&mut store, &token).unwrap(),
        UnsubscribeResult::Success
    );
    let email = store.email_by_token(&token).unwrap().unwrap();
    assert_eq!(email.status, EmailStatus::Unsubscribed);
    assert_eq!(
        store.user(user_id).unwrap().unwrap().status,
        UserStatus::Deactivated
    );

    // --- The next scheduler sweep no longer selects this user ---
    let scheduled = scheduler.run(&mut store).unwrap();
    assert!(scheduled.is_empty());
}

fn clock_now(clock: &MockTimeSource) -> DateTime<Utc> {
    use keywatch_core::ports::outbound::TimeSource;
    clock.now()
}

#[test]
fn test_stale_task_expires_instead_of_executing() {
    let mut store = MemoryStore::new();
    let mailer = MockMailer::new();
    let signup = SignupProcessor::new(
        MockTimeSource::new(ts(1_000_000)),
        FREQUENCY_MINUTES,
        "http://keywatch.example.com/",
    )
    .unwrap();
    signup
        .register(
            &mut store,
            &mailer,
            &registration("+15555550100", "a@example.com"),
        )
        .unwrap();

    // The immediate task expires after one interval; two intervals later a
    // lookup sweep must reclassify it rather than run it.
    let late = ts(1_000_000) + chrono::Duration::minutes(i64::from(FREQUENCY_MINUTES) * 2);
    let fetcher = MockKeyFetcher::new();
    let executor = LookupExecutor::new(MockTimeSource::new(late), "+15555559999", "203.0.113.7");
    let expiry = ExpirySweep::new(MockTimeSource::new(late));

    let keys = executor.run(&mut store, &fetcher, &expiry).unwrap();
    assert!(keys.is_empty());
    assert!(fetcher.calls().is_empty());
    assert!(store.pending_tasks().unwrap().is_empty());
}

#[test]
fn test_failed_notification_is_retried_without_duplicate_change_rows() {
    let mut store = MemoryStore::new();
    let signup = SignupProcessor::new(
        MockTimeSource::new(ts(1_000_000)),
        FREQUENCY_MINUTES,
        "http://keywatch.example.com/",
    )
    .unwrap();
    let executor = LookupExecutor::new(
        MockTimeSource::new(ts(1_000_000)),
        "+15555559999",
        "203.0.113.7",
    );
    let detector = ChangeDetector::new();
    let notifier = Notifier::new(MockTimeSource::new(ts(1_000_000)));

    let setup_mailer = MockMailer::new();
    signup
        .register(
            &mut store,
            &setup_mailer,
            &registration("+15555550100", "a@example.com"),
        )
        .unwrap();

    // Two lookups through one retried task snapshot produce the change.
    let fetcher = MockKeyFetcher::new()
        .with_keys(vec![RawKey::new(vec![0xAA])])
        .with_keys(vec![RawKey::new(vec![0xBB])]);
    let expiry = ExpirySweep::new(MockTimeSource::new(ts(1_000_000)));
    executor.run(&mut store, &fetcher, &expiry).unwrap();
    detector.run(&mut store).unwrap();

    let task = store
        .create_task(1, ts(1_000_000), ts(1_003_600))
        .unwrap();
    executor.perform_lookup(&mut store, &fetcher, &task).unwrap();
    detector.run(&mut store).unwrap();
    assert_eq!(store.new_changes().unwrap().len(), 1);

    // First dispatch fails; the change stays NEW and no duplicate appears.
    let failing = MockMailer::new().with_failure(
        keywatch_core::domain::errors::MailError::Transport {
            message: "socket closed".into(),
        },
    );
    assert!(notifier.run(&mut store, &failing).unwrap().is_empty());
    assert_eq!(store.new_changes().unwrap().len(), 1);

    // Second dispatch succeeds and closes the change.
    let working = MockMailer::new();
    let sent = notifier.run(&mut store, &working).unwrap();
    assert_eq!(sent.len(), 1);
    assert!(store.new_changes().unwrap().is_empty());
}

#[test]
fn test_reregistration_with_new_address_notifies_only_the_new_one() {
    let mut store = MemoryStore::new();
    let mailer = MockMailer::new();
    let signup = SignupProcessor::new(
        MockTimeSource::new(ts(1_000_000)),
        FREQUENCY_MINUTES,
        "http://keywatch.example.com/",
    )
    .unwrap();
    let executor = LookupExecutor::new(
        MockTimeSource::new(ts(1_000_000)),
        "+15555559999",
        "203.0.113.7",
    );
    let detector = ChangeDetector::new();

    signup
        .register(
            &mut store,
            &mailer,
            &registration("+15555550100", "old@example.com"),
        )
        .unwrap();
    signup
        .register(
            &mut store,
            &mailer,
            &registration("+15555550100", "new@example.com"),
        )
        .unwrap();

    // Record a change by running two lookups with differing values.
    let fetcher = MockKeyFetcher::new()
        .with_keys(vec![RawKey::new(vec![0xAA])])
        .with_keys(vec![RawKey::new(vec![0xBB])]);
    let expiry = ExpirySweep::new(MockTimeSource::new(ts(1_000_000)));
    executor.run(&mut store, &fetcher, &expiry).unwrap();
    detector.run(&mut store).unwrap();

    let task = store.create_task(1, ts(1_000_000), ts(1_003_600)).unwrap();
    executor.perform_lookup(&mut store, &fetcher, &task).unwrap();
    detector.run(&mut store).unwrap();

    let notifier = Notifier::new(MockTimeSource::new(ts(1_000_000)));
    let sent_before = mailer.sent_count();
    notifier.run(&mut store, &mailer).unwrap();

    let sent = mailer.sent();
    let warnings = &sent[sent_before..];
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].to, "new@example.com");
}
