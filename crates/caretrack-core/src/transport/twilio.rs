//! SMS delivery through the Twilio Messages REST API.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Transport;
use crate::error::TransportError;

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Credentials and sender number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number in E.164 form, e.g. `+15550001111`.
    pub from_number: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

/// Blocking HTTP transport. Call [`Transport::send`] from a blocking
/// context (plain thread or `spawn_blocking`), never directly on an async
/// worker.
pub struct TwilioTransport {
    settings: TwilioSettings,
    client: Mutex<Option<reqwest::blocking::Client>>,
}

impl TwilioTransport {
    /// # Errors
    /// Returns [`TransportError::Misconfigured`] if any setting is blank.
    pub fn new(settings: TwilioSettings) -> Result<Self, TransportError> {
        for (field, value) in [
            ("account_sid", &settings.account_sid),
            ("auth_token", &settings.auth_token),
            ("from_number", &settings.from_number),
        ] {
            if value.trim().is_empty() {
                return Err(TransportError::Misconfigured(format!("twilio {field} is empty")));
            }
        }
        Ok(Self {
            settings,
            client: Mutex::new(None),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.account_sid
        )
    }

    // Built lazily so construction is safe inside an async runtime.
    fn client(&self) -> Result<reqwest::blocking::Client, TransportError> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| TransportError::Unreachable("twilio client poisoned".into()))?;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TransportError::Misconfigured(e.to_string()))?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

impl Transport for TwilioTransport {
    fn name(&self) -> &str {
        "twilio"
    }

    fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let recipient = if to.starts_with('+') {
            to.to_string()
        } else {
            format!("+{to}")
        };
        let response = self
            .client()?
            .post(self.messages_url())
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&[
                ("To", recipient.as_str()),
                ("From", self.settings.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = %recipient, "twilio accepted message");
            return Ok(());
        }
        let message = response.text().unwrap_or_default();
        Err(TransportError::Rejected {
            to: recipient,
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(api_base: String) -> TwilioSettings {
        TwilioSettings {
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
            from_number: "+15550001111".into(),
            api_base,
        }
    }

    #[test]
    fn rejects_blank_credentials() {
        let mut s = settings(DEFAULT_API_BASE.into());
        s.auth_token = " ".into();
        assert!(matches!(
            TwilioTransport::new(s),
            Err(TransportError::Misconfigured(_))
        ));
    }

    #[test]
    fn posts_form_to_messages_endpoint() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".into(), "+15551234567".into()),
                Matcher::UrlEncoded("From".into(), "+15550001111".into()),
                Matcher::UrlEncoded("Body".into(), "Take your pills".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"sid":"SM1"}"#)
            .create();

        let transport = TwilioTransport::new(settings(server.url())).unwrap();
        transport.send("15551234567", "Take your pills").unwrap();
        mock.assert();
    }

    #[test]
    fn non_success_status_is_rejection() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(400)
            .with_body("invalid number")
            .create();

        let transport = TwilioTransport::new(settings(server.url())).unwrap();
        let err = transport.send("+1555", "hi").unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                to: "+1555".into(),
                status: 400,
                message: "invalid number".into(),
            }
        );
    }
}
