//! Carrier transport abstraction.
//!
//! The dispatch engine depends only on [`SmsTransport`]: send one body to
//! one recipient and get back a provider message id, or a classified
//! [`TransportError`].
//!
//! One implementation ships:
//! - [`twilio::TwilioTransport`]: Twilio Programmable Messaging REST API

use async_trait::async_trait;

use crate::redactor::Redactor;

pub mod twilio;

/// Confirmation returned by the provider for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-assigned message identifier.
    pub id: String,
}

/// Errors returned by a transport.
///
/// `Network` errors are stripped of their URL, which carries the account id.
/// Every variant is treated as retryable by the dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request was sent but no response came back.
    #[error("transport request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider responded with a non-success status.
    #[error("provider returned non-success status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Scrubbed, truncated response body.
        body: String,
    },
    /// The provider response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Anything else.
    #[error("transport error: {0}")]
    Other(String),
}

/// Coarse origin of a transport failure, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Server responded with an error status.
    Response,
    /// Request went out, nothing usable came back.
    NoResponse,
    /// Failure before or after the exchange.
    Other,
}

impl TransportError {
    /// Classify the failure for logging.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Status { .. } => FailureClass::Response,
            Self::Network(e) if e.is_status() => FailureClass::Response,
            Self::Network(_) => FailureClass::NoResponse,
            Self::Parse(_) | Self::Other(_) => FailureClass::Other,
        }
    }

    /// HTTP status if the provider returned one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Parse(_) | Self::Other(_) => None,
        }
    }
}

/// Outbound SMS capability.
///
/// Implementations must be `Send + Sync` so a dispatcher can hold one
/// behind an `Arc` across await points.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Send `body` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on network, provider, or parse failure.
    async fn send(&self, recipient: &str, body: &str) -> Result<SendReceipt, TransportError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Check HTTP response status and return body text or a structured error.
///
/// Error bodies are scrubbed through `redactor` before they are stored.
///
/// # Errors
///
/// Returns `TransportError::Network` on read failure, `TransportError::Status` on non-2xx.
pub async fn check_http_response(
    response: reqwest::Response,
    redactor: &Redactor,
) -> Result<String, TransportError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Network(e.without_url()))?;
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: redactor.scrub_error_body(&body),
        });
    }
    Ok(body)
}
