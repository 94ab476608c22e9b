//! Twilio transport using the `/2010-04-01/Accounts/{sid}/Messages.json` API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::TwilioAuth;
use crate::redactor::{mask_recipient_in, Redactor};

use super::{check_http_response, SendReceipt, SmsTransport, TransportError};

const TWILIO_API_VERSION: &str = "2010-04-01";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Form body for message creation.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct CreateMessageForm<'a> {
    /// Recipient number.
    #[serde(rename = "To")]
    pub to: &'a str,
    /// Sender number.
    #[serde(rename = "From")]
    pub from: &'a str,
    /// Message text.
    #[serde(rename = "Body")]
    pub body: &'a str,
}

/// Subset of the message resource returned on creation.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct MessageResource {
    /// Message SID (`SM...`).
    pub sid: String,
    /// Delivery status at creation time (`queued`, `accepted`, ...).
    #[serde(default)]
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Twilio Programmable Messaging transport.
#[derive(Debug, Clone)]
pub struct TwilioTransport {
    base_url: url::Url,
    auth: TwilioAuth,
    client: reqwest::Client,
    redactor: Redactor,
}

impl TwilioTransport {
    /// Create a transport against `base_url` (normally `https://api.twilio.com`).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, auth: TwilioAuth, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid transport base_url {base_url:?}: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        let redactor = Redactor::new(auth.secret_values());
        Ok(Self {
            base_url,
            auth,
            client,
            redactor,
        })
    }

    /// Also scrub `secrets` (every loaded credential value) from error bodies.
    pub fn with_known_secrets(mut self, secrets: Vec<String>) -> Self {
        let mut all = self.auth.secret_values();
        all.extend(secrets);
        self.redactor = Redactor::new(all);
        self
    }

    /// Full URL of the message creation endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the URL cannot be joined.
    pub fn messages_url(&self) -> Result<url::Url, TransportError> {
        let path = format!(
            "{TWILIO_API_VERSION}/Accounts/{}/Messages.json",
            self.auth.account_sid
        );
        self.base_url
            .join(&path)
            .map_err(|e| TransportError::Other(format!("invalid messages url: {e}")))
    }
}

/// Parse a message-creation response body into a receipt.
///
/// # Errors
///
/// Returns [`TransportError::Parse`] when the body is not a message resource.
#[doc(hidden)]
pub fn parse_receipt(body: &str) -> Result<SendReceipt, TransportError> {
    let resource: MessageResource =
        serde_json::from_str(body).map_err(|e| TransportError::Parse(e.to_string()))?;
    if resource.sid.is_empty() {
        return Err(TransportError::Parse("message sid is empty".to_owned()));
    }
    debug!(status = ?resource.status, "twilio accepted message");
    Ok(SendReceipt { id: resource.sid })
}

#[async_trait]
impl SmsTransport for TwilioTransport {
    async fn send(&self, recipient: &str, body: &str) -> Result<SendReceipt, TransportError> {
        let url = self.messages_url()?;
        let form = CreateMessageForm {
            to: recipient,
            from: &self.auth.from_number,
            body,
        };

        let response = self
            .client
            .post(url)
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url()))?;

        let text = check_http_response(response, &self.redactor)
            .await
            .map_err(|e| match e {
                TransportError::Status { status, body } => TransportError::Status {
                    status,
                    body: mask_recipient_in(&body, recipient),
                },
                other => other,
            })?;
        parse_receipt(&text)
    }

    fn name(&self) -> &str {
        "twilio"
    }
}
