//! Validated value types shared across the pipeline.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// An E.164-shaped phone number (`+` followed by 2..=15 digits).
///
/// Validation happens at construction; a held value is always well-formed,
/// including after deserialization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(number: impl Into<String>) -> Result<Self, ValidationError> {
        let number = number.into();
        if !is_valid_phone_number(&number) {
            return Err(ValidationError::InvalidPhoneNumber { value: number });
        }
        Ok(PhoneNumber(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhoneNumber::new(value)
    }
}

impl From<PhoneNumber> for String {
    fn from(number: PhoneNumber) -> Self {
        number.0
    }
}

fn is_valid_phone_number(number: &str) -> bool {
    let Some(digits) = number.strip_prefix('+') else {
        return false;
    };
    (2..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}

/// A structurally valid email address.
///
/// This is a shape check (single `@`, nonempty local part, dotted domain), not
/// a deliverability check; the mail provider is the final arbiter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Result<Self, ValidationError> {
        let address = address.into();
        if !is_valid_email(&address) {
            return Err(ValidationError::InvalidEmailAddress { value: address });
        }
        Ok(EmailAddress(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EmailAddress::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.0
    }
}

fn is_valid_email(address: &str) -> bool {
    if address.len() > 254 || address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    // A second '@' is not allowed.
    if domain.contains('@') {
        return false;
    }
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// One opaque per-device key as returned by the key-retrieval protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawKey(Vec<u8>);

impl RawKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        RawKey(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawKey {
    fn from(bytes: Vec<u8>) -> Self {
        RawKey(bytes)
    }
}

/// An inbound registration request: "watch this phone number, mail me here".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationMessage {
    pub phone_number: PhoneNumber,
    pub email: EmailAddress,
}

/// Collapses fetched device keys into one deterministic, comparable value:
/// each key uppercase hex-encoded, joined with commas, fetch order preserved.
pub fn canonical_key_list(keys: &[RawKey]) -> String {
    keys.iter()
        .map(|key| hex::encode_upper(key.as_bytes()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of random bytes in an unsubscribe token.
const TOKEN_RANDOM_BYTES: usize = 16;

/// Mints an unsubscribe token: current wall-clock milliseconds concatenated
/// with 16 cryptographically random bytes, hex-encoded.
///
/// Practically unique and unguessable without a storage-level uniqueness
/// round-trip.
pub fn mint_unsubscribe_token(now: DateTime<Utc>) -> String {
    let mut bytes = [0u8; TOKEN_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", now.timestamp_millis(), hex::encode_upper(bytes))
}
