//! Mock collaborators for tests.
//!
//! Public so downstream crates (gateway, runtime, the unified test suite) can
//! drive the pipeline without network or clock. Scripted results are consumed
//! front to back; mutation behind `&self` goes through mutexes because the
//! port methods take shared references.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::errors::{FetchError, MailError, SourceError};
use crate::domain::value_objects::{EmailAddress, PhoneNumber, RawKey, RegistrationMessage};
use crate::ports::outbound::{Mailer, MessageSource, RawKeyFetcher, TimeSource};

/// Key fetcher returning pre-scripted results in order.
#[derive(Default)]
pub struct MockKeyFetcher {
    results: Mutex<VecDeque<Result<Vec<RawKey>, FetchError>>>,
    calls: Mutex<Vec<PhoneNumber>>,
}

impl MockKeyFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts one successful fetch producing these keys.
    pub fn with_keys(self, keys: Vec<RawKey>) -> Self {
        self.results.lock().unwrap().push_back(Ok(keys));
        self
    }

    /// Scripts one failing fetch.
    pub fn with_error(self, error: FetchError) -> Self {
        self.results.lock().unwrap().push_back(Err(error));
        self
    }

    /// Phone numbers fetched so far, in call order.
    pub fn calls(&self) -> Vec<PhoneNumber> {
        self.calls.lock().unwrap().clone()
    }
}

impl RawKeyFetcher for MockKeyFetcher {
    fn fetch(&self, phone_number: &PhoneNumber) -> Result<Vec<RawKey>, FetchError> {
        self.calls.lock().unwrap().push(phone_number.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(FetchError::Transport {
                    message: "no scripted fetch result left".into(),
                })
            })
    }
}

/// One delivered email, as recorded by [`MockMailer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer recording every send; failures can be queued up front.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<SentMail>>,
    failures: Mutex<VecDeque<MailError>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next send to fail with `error`; later sends succeed again.
    pub fn with_failure(self, error: MailError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Mailer for MockMailer {
    fn send(&self, to: &EmailAddress, subject: &str, body: &str) -> Result<(), MailError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.as_str().to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

/// Message source yielding scripted batches, then empty batches forever.
#[derive(Default)]
pub struct MockMessageSource {
    batches: VecDeque<Vec<RegistrationMessage>>,
    failure: Option<SourceError>,
}

impl MockMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(mut self, batch: Vec<RegistrationMessage>) -> Self {
        self.batches.push_back(batch);
        self
    }

    /// Makes the next poll fail once.
    pub fn with_failure(mut self, error: SourceError) -> Self {
        self.failure = Some(error);
        self
    }
}

impl MessageSource for MockMessageSource {
    fn poll(&mut self) -> Result<Vec<RegistrationMessage>, SourceError> {
        if let Some(error) = self.failure.take() {
            return Err(error);
        }
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}

/// Deterministic clock for schedule and expiry tests.
pub struct MockTimeSource {
    millis: AtomicI64,
}

impl MockTimeSource {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(initial.timestamp_millis()),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        self.millis.store(time.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.millis
            .fetch_add(minutes * 60_000, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}
