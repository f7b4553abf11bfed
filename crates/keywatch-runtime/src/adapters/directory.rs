//! Key fetcher implementation against the network's key directory.
//!
//! Credentials come from the provisioning file the signal-cli registration
//! flow leaves behind (a JSON object with `username` and `password`). The
//! directory returns per-device key bundles; the identity key travels
//! base64-encoded and is decoded to raw bytes here, preserving response
//! order because canonicalization is order-sensitive.

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, error};

use keywatch_core::domain::errors::FetchError;
use keywatch_core::domain::value_objects::{PhoneNumber, RawKey};
use keywatch_core::ports::outbound::RawKeyFetcher;

const TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the key directory, authenticated with provisioning
/// credentials.
pub struct DirectoryFetcher {
    agent: ureq::Agent,
    url: String,
    authorization: String,
}

impl DirectoryFetcher {
    /// Builds a fetcher from the provisioning credentials stored at `path`.
    pub fn from_credentials_file(
        url: impl Into<String>,
        path: &Path,
    ) -> Result<Self, FetchError> {
        let text = fs::read_to_string(path).map_err(|err| FetchError::Malformed {
            message: format!("cannot read credentials file {}: {err}", path.display()),
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|err| FetchError::Malformed {
                message: format!("credentials file {} is not JSON: {err}", path.display()),
            })?;

        let field = |name: &str| -> Result<&str, FetchError> {
            json.get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| FetchError::Malformed {
                    message: format!("credentials file missing {name}"),
                })
        };
        let username = field("username")?;
        let password = field("password")?;

        Ok(Self::new(url, username, password))
    }

    pub fn new(url: impl Into<String>, username: &str, password: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(TIMEOUT)
            .timeout_read(TIMEOUT)
            .timeout_write(TIMEOUT)
            .user_agent("Keywatch 0.1.0")
            .build();
        let authorization = format!("Basic {}", BASE64.encode(format!("{username}:{password}")));
        Self {
            agent,
            url: url.into(),
            authorization,
        }
    }

    fn endpoint(&self, phone_number: &PhoneNumber) -> String {
        format!("{}/v2/keys/{}/*", self.url, phone_number)
    }
}

/// Extracts one raw identity key per device bundle from the directory's
/// response body.
fn parse_key_response(body: &str) -> Result<Vec<RawKey>, FetchError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|err| FetchError::Malformed {
            message: format!("directory response is not JSON: {err}"),
        })?;

    let account_key = json.get("identityKey").and_then(|v| v.as_str());
    let devices = json
        .get("devices")
        .and_then(|v| v.as_array())
        .ok_or_else(|| FetchError::Malformed {
            message: "directory response has no devices array".into(),
        })?;

    let mut keys = Vec::with_capacity(devices.len());
    for device in devices {
        // Older server revisions carry the key per device; newer ones hoist
        // it to the top level of the bundle.
        let encoded = device
            .get("identityKey")
            .and_then(|v| v.as_str())
            .or(account_key)
            .ok_or_else(|| FetchError::Malformed {
                message: "device bundle has no identity key".into(),
            })?;
        let bytes = BASE64.decode(encoded).map_err(|err| FetchError::Malformed {
            message: format!("identity key is not valid base64: {err}"),
        })?;
        keys.push(RawKey::new(bytes));
    }
    Ok(keys)
}

impl RawKeyFetcher for DirectoryFetcher {
    fn fetch(&self, phone_number: &PhoneNumber) -> Result<Vec<RawKey>, FetchError> {
        debug!(phone = %phone_number, "querying key directory");

        let response = self
            .agent
            .get(&self.endpoint(phone_number))
            .set("Authorization", &self.authorization)
            .call();

        match response {
            Ok(response) => {
                let body = response.into_string().map_err(|err| FetchError::Transport {
                    message: format!("failed to read directory response: {err}"),
                })?;
                parse_key_response(&body)
            }
            Err(ureq::Error::Status(401, _)) => {
                error!("key directory rejected credentials");
                Err(FetchError::Unauthorized)
            }
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Transport {
                message: format!("key directory returned status {status}"),
            }),
            Err(ureq::Error::Transport(transport)) => Err(FetchError::Transport {
                message: transport.to_string(),
            }),
        }
    }
}
