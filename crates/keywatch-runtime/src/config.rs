//! Runtime configuration, sourced from `KEYWATCH_*` environment variables.
//!
//! Built once at startup and passed by reference into every component;
//! nothing reads ambient global state after that. Variables with a default
//! fall back silently; variables without one fail `load()` by name.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use keywatch_core::domain::value_objects::PhoneNumber;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing config: {name}")]
    Missing { name: &'static str },

    #[error("invalid config {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("lookup frequency must be at least 2 minutes, got {minutes}")]
    FrequencyTooLow { minutes: u32 },

    #[error("unsubscribe service port must not be 0")]
    PortZero,

    #[error("email sending domain must not be empty")]
    EmptyDomain,
}

/// Everything the service needs to run, validated and ready to pass around.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    /// Path of the JSON snapshot store.
    pub store_path: PathBuf,
    /// Sender identity for all outbound mail.
    pub email_from: String,
    /// Sending domain as used by the mail provider API.
    pub email_domain: String,
    /// Base URL of the mail provider API.
    pub mailgun_url: String,
    /// Mail provider API key.
    pub mailgun_api_key: String,
    /// Average lookup frequency in minutes.
    pub lookup_frequency_minutes: u32,
    /// Origin IP recorded on each key.
    pub lookup_ip: String,
    /// The service's own registered phone number.
    pub phone_number: PhoneNumber,
    /// Base URL of the network's key directory.
    pub directory_url: String,
    /// Path of the provisioning credentials file.
    pub credentials_file: PathBuf,
    /// Port of the unsubscribe web service.
    pub port: u16,
    /// Public base URL used in welcome-email unsubscribe links.
    pub unsubscribe_url: String,
}

impl WatchConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Loads configuration from an explicit variable map. `load()` in
    /// disguise, so tests never mutate the process environment.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| -> Option<String> {
            vars.get(name).filter(|v| !v.is_empty()).cloned()
        };
        let required = |name: &'static str| -> Result<String, ConfigError> {
            get(name).ok_or(ConfigError::Missing { name })
        };

        let phone_raw = required("KEYWATCH_PHONE_NUMBER")?;
        let phone_number = PhoneNumber::new(phone_raw.clone()).map_err(|_| {
            ConfigError::Invalid {
                name: "KEYWATCH_PHONE_NUMBER",
                value: phone_raw,
            }
        })?;

        let frequency_raw =
            get("KEYWATCH_LOOKUP_FREQUENCY").unwrap_or_else(|| "60".to_string());
        let lookup_frequency_minutes =
            frequency_raw
                .parse::<u32>()
                .map_err(|_| ConfigError::Invalid {
                    name: "KEYWATCH_LOOKUP_FREQUENCY",
                    value: frequency_raw.clone(),
                })?;

        let port_raw = get("KEYWATCH_PORT").unwrap_or_else(|| "8080".to_string());
        let port = port_raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
            name: "KEYWATCH_PORT",
            value: port_raw.clone(),
        })?;

        let credentials_file = get("KEYWATCH_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_credentials_file(vars, phone_number.as_str()));

        let config = Self {
            store_path: get("KEYWATCH_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("keywatch-store.json")),
            email_from: get("KEYWATCH_EMAIL_FROM")
                .unwrap_or_else(|| "Keywatch <keywatch@example.com>".to_string()),
            email_domain: required("KEYWATCH_EMAIL_DOMAIN")?,
            mailgun_url: get("KEYWATCH_MAILGUN_URL")
                .unwrap_or_else(|| "https://api.mailgun.net/".to_string()),
            mailgun_api_key: required("KEYWATCH_MAILGUN_API_KEY")?,
            lookup_frequency_minutes,
            lookup_ip: get("KEYWATCH_LOOKUP_IP").unwrap_or_else(|| "127.0.0.1".to_string()),
            phone_number,
            directory_url: get("KEYWATCH_DIRECTORY_URL")
                .unwrap_or_else(|| "https://textsecure-service.whispersystems.org".to_string()),
            credentials_file,
            port,
            unsubscribe_url: get("KEYWATCH_UNSUBSCRIBE_URL")
                .unwrap_or_else(|| "http://example.com/".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Fails fast on values that would only break later: a frequency the
    /// scheduler cannot jitter within, port 0, an empty sending domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup_frequency_minutes < 2 {
            return Err(ConfigError::FrequencyTooLow {
                minutes: self.lookup_frequency_minutes,
            });
        }
        if self.port == 0 {
            return Err(ConfigError::PortZero);
        }
        if self.email_domain.trim().is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        Ok(())
    }
}

/// `~/.config/signal/data/<number>`, with `~` resolved from `$HOME`.
fn default_credentials_file(vars: &HashMap<String, String>, number: &str) -> PathBuf {
    let home = vars.get("HOME").cloned().unwrap_or_else(|| "~".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("signal")
        .join("data")
        .join(number)
}
