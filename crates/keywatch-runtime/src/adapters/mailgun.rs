//! Mailer implementation against the Mailgun HTTP API.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, error, info};

use keywatch_core::domain::errors::MailError;
use keywatch_core::domain::value_objects::EmailAddress;
use keywatch_core::ports::outbound::Mailer;

const TIMEOUT: Duration = Duration::from_secs(30);

/// Sends mail through `POST {base}v3/{domain}/messages` with HTTP Basic auth
/// (username `api`, the API key as password).
pub struct MailgunMailer {
    agent: ureq::Agent,
    url: String,
    domain: String,
    from: String,
    authorization: String,
}

impl MailgunMailer {
    pub fn new(
        url: impl Into<String>,
        domain: impl Into<String>,
        api_key: &str,
        from: impl Into<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(TIMEOUT)
            .timeout_read(TIMEOUT)
            .timeout_write(TIMEOUT)
            .build();
        let authorization = format!("Basic {}", BASE64.encode(format!("api:{api_key}")));
        Self {
            agent,
            url: url.into(),
            domain: domain.into(),
            from: from.into(),
            authorization,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}v3/{}/messages", self.url, self.domain)
    }
}

impl Mailer for MailgunMailer {
    fn send(&self, to: &EmailAddress, subject: &str, body: &str) -> Result<(), MailError> {
        debug!(to = %to, subject, "sending email through mail provider");

        let response = self
            .agent
            .post(&self.endpoint())
            .set("Authorization", &self.authorization)
            .send_form(&[
                ("from", &self.from),
                ("to", to.as_str()),
                ("subject", subject),
                ("text", body),
            ]);

        match response {
            Ok(_) => {
                info!(to = %to, "email sent");
                Ok(())
            }
            // 401 means the API key is wrong, which no retry will fix.
            Err(ureq::Error::Status(401, _)) => {
                error!("mail provider rejected credentials");
                Err(MailError::InvalidCredentials)
            }
            Err(ureq::Error::Status(status, response)) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "unreadable response body".to_string());
                error!(status, %message, "mail provider rejected send");
                Err(MailError::Rejected { status, message })
            }
            Err(ureq::Error::Transport(transport)) => Err(MailError::Transport {
                message: transport.to_string(),
            }),
        }
    }
}
