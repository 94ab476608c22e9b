//! Dispatch engine: bounded-retry delivery and the orchestration around it.
//!
//! A dispatch is one end-to-end delivery of one message to one recipient,
//! retries included. Failures fall into three buckets:
//!
//! - invalid recipient: terminal before any side effect (400-equivalent)
//! - transport failure: retried up to the budget, then terminal (500-equivalent)
//! - cursor persistence failure: logged and absorbed, never fails a dispatch

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{SendReceipt, TransportError};

pub mod attempt;
pub mod dispatcher;

pub use attempt::{AttemptOutcome, AttemptState, DeliveryAttempt};
pub use dispatcher::{DispatchSettings, Dispatcher};

/// Reason reported for a confirmed delivery.
pub const MSG_SENT: &str = "SMS sent successfully.";

/// Reason reported when the recipient fails validation.
pub const MSG_INVALID_RECIPIENT: &str = "Invalid phone number.";

/// Reason reported when the retry budget is exhausted.
pub const MSG_RETRIES_EXHAUSTED: &str = "Failed to send SMS after retries.";

/// Fixed retry budget for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transport calls allowed, including the first.
    pub max_attempts: u32,
    /// Wait between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(5_000),
        }
    }
}

/// Errors that end a dispatch unsuccessfully.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Recipient did not pass phone validation.
    #[error("invalid phone number: {masked}")]
    InvalidRecipient {
        /// Masked recipient.
        masked: String,
    },

    /// Every attempt in the budget failed.
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    DeliveryFailed {
        /// Transport calls made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last_error: TransportError,
    },
}

/// Category of a dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Provider confirmed the message.
    Sent,
    /// Recipient rejected before any send.
    InvalidRecipient,
    /// Retry budget exhausted.
    DeliveryFailed,
}

impl DispatchError {
    /// Outcome category for this error.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::InvalidRecipient { .. } => OutcomeKind::InvalidRecipient,
            Self::DeliveryFailed { .. } => OutcomeKind::DeliveryFailed,
        }
    }
}

/// Structured outcome surfaced to the trigger.
///
/// Serializes as `{"success": bool, "message": string}`; provider payloads
/// never appear in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    /// Whether the provider confirmed delivery.
    pub success: bool,
    /// Human-readable reason.
    pub message: String,
    /// Outcome category.
    #[serde(skip)]
    pub kind: OutcomeKind,
    /// Provider message id on success.
    #[serde(skip)]
    pub receipt_id: Option<String>,
}

impl DispatchResult {
    /// Successful delivery.
    pub fn sent(receipt: SendReceipt) -> Self {
        Self {
            success: true,
            message: MSG_SENT.to_owned(),
            kind: OutcomeKind::Sent,
            receipt_id: Some(receipt.id),
        }
    }

    /// HTTP status an HTTP trigger should answer with.
    pub fn http_status(&self) -> u16 {
        match self.kind {
            OutcomeKind::Sent => 200,
            OutcomeKind::InvalidRecipient => 400,
            OutcomeKind::DeliveryFailed => 500,
        }
    }
}

impl From<&DispatchError> for DispatchResult {
    fn from(err: &DispatchError) -> Self {
        let message = match err {
            DispatchError::InvalidRecipient { .. } => MSG_INVALID_RECIPIENT,
            DispatchError::DeliveryFailed { .. } => MSG_RETRIES_EXHAUSTED,
        };
        Self {
            success: false,
            message: message.to_owned(),
            kind: err.kind(),
            receipt_id: None,
        }
    }
}

impl From<Result<SendReceipt, DispatchError>> for DispatchResult {
    fn from(result: Result<SendReceipt, DispatchError>) -> Self {
        match result {
            Ok(receipt) => Self::sent(receipt),
            Err(err) => Self::from(&err),
        }
    }
}

/// On-demand request carrying an explicit recipient and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Recipient phone number.
    pub phone_number: String,
    /// Message body.
    pub message: String,
}

impl DispatchRequest {
    /// Parse the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a `{phoneNumber, message}` object.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
