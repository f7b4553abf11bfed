//! Registration message source backed by the signal-cli subprocess.
//!
//! One poll runs signal-cli in receive mode with a short timeout, pointing
//! its JSON log at a temp file, then parses that file as JSON lines. Control
//! lines (objects carrying `init` or `done`) are skipped silently; malformed
//! registration lines warn and are skipped; only launch or exit failures
//! fail the whole poll.

use std::fs;
use std::process::Command;

use tracing::{debug, info, warn};

use keywatch_core::domain::errors::SourceError;
use keywatch_core::domain::value_objects::{EmailAddress, PhoneNumber, RegistrationMessage};
use keywatch_core::ports::outbound::MessageSource;

/// Polls signal-cli for inbound registration messages.
pub struct SignalCliSource {
    /// The service's own registered number, passed as `--username`.
    service_number: PhoneNumber,
}

impl SignalCliSource {
    pub fn new(service_number: PhoneNumber) -> Self {
        Self { service_number }
    }
}

impl MessageSource for SignalCliSource {
    fn poll(&mut self) -> Result<Vec<RegistrationMessage>, SourceError> {
        let logfile = tempfile::Builder::new()
            .prefix("keywatch.signal-cli.")
            .suffix(".log")
            .tempfile()
            .map_err(|err| SourceError::Launch {
                message: format!("cannot create temp logfile: {err}"),
            })?;

        let status = Command::new("signal-cli")
            .arg("--username")
            .arg(self.service_number.as_str())
            .arg("json")
            .arg("--logfile")
            .arg(logfile.path())
            .arg("--ignore-attachments")
            .arg("--timeout")
            .arg("1")
            .status()
            .map_err(|err| SourceError::Launch {
                message: format!("failed to launch signal-cli: {err}"),
            })?;

        if !status.success() {
            return Err(SourceError::Exit {
                code: status.code().unwrap_or(-1),
            });
        }

        let text = fs::read_to_string(logfile.path()).map_err(|err| SourceError::Read {
            message: format!("cannot read signal-cli output: {err}"),
        })?;

        let messages = parse_lines(&text);
        info!(messages = messages.len(), "signal-cli poll complete");
        Ok(messages)
    }
}

/// Parses the JSON-lines output, skipping control lines and warning on
/// malformed ones.
fn parse_lines(text: &str) -> Vec<RegistrationMessage> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_line(line) {
            Ok(message) => message,
            Err(reason) => {
                warn!(%reason, line, "skipping malformed registration line");
                None
            }
        })
        .collect()
}

fn parse_line(line: &str) -> Result<Option<RegistrationMessage>, String> {
    let tree: serde_json::Value =
        serde_json::from_str(line).map_err(|err| format!("failed at parsing line as JSON: {err}"))?;

    if !tree.is_object() {
        return Err("expected object at top level".into());
    }

    // Objects with init or done fields are control output, not messages.
    if tree.get("init").is_some() || tree.get("done").is_some() {
        debug!("skipping control line");
        return Ok(None);
    }

    let number = tree
        .pointer("/envelope/from/number")
        .and_then(|v| v.as_str())
        .ok_or("failed to find envelope.from.number")?;
    let phone_number =
        PhoneNumber::new(number).map_err(|err| format!("invalid sender number: {err}"))?;

    let body = tree
        .pointer("/data/body")
        .and_then(|v| v.as_str())
        .ok_or("failed to find data.body")?
        .trim();

    // The body should be nothing but the subscriber's email address.
    let email =
        EmailAddress::new(body).map_err(|err| format!("message body is not an email: {err}"))?;

    Ok(Some(RegistrationMessage {
        phone_number,
        email,
    }))
}
