//! Delivery state machine.
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!             |  ^
//!             v  |
//!           Retrying          (attempt < max_attempts - 1)
//!             |
//! Attempting -> Failed        (attempt == max_attempts - 1)
//! ```
//!
//! Every transport failure is retryable; the only early exit is an invalid
//! recipient, which is rejected before this machine is entered.

use tracing::{error, info, warn};

use crate::delay::Pause;
use crate::redactor::{mask_recipient, mask_recipient_in};
use crate::transport::{FailureClass, SendReceipt, SmsTransport, TransportError};

use super::RetryPolicy;

/// States of one delivery. Attempt numbers are 0-based.
#[derive(Debug)]
pub enum AttemptState {
    /// Not started.
    Idle,
    /// About to call the transport.
    Attempting {
        /// Attempt about to run.
        attempt: u32,
    },
    /// Last call failed and budget remains; backoff is pending.
    Retrying {
        /// Attempt that just failed.
        attempt: u32,
    },
    /// Provider confirmed the message.
    Succeeded {
        /// Attempt that succeeded.
        attempt: u32,
        /// Provider confirmation.
        receipt: SendReceipt,
    },
    /// Budget exhausted.
    Failed {
        /// Final attempt.
        attempt: u32,
        /// Error from the final attempt.
        error: TransportError,
    },
}

impl AttemptState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Terminal result of a [`DeliveryAttempt`].
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Delivered.
    Succeeded {
        /// Provider confirmation.
        receipt: SendReceipt,
        /// Transport calls made.
        attempts: u32,
    },
    /// Every attempt failed.
    Failed {
        /// Error from the final attempt.
        error: TransportError,
        /// Transport calls made.
        attempts: u32,
    },
}

/// One delivery of `body` to `recipient` under a [`RetryPolicy`].
pub struct DeliveryAttempt<'a> {
    transport: &'a dyn SmsTransport,
    pause: &'a dyn Pause,
    policy: RetryPolicy,
    recipient: &'a str,
    masked: String,
    body: &'a str,
}

impl std::fmt::Debug for DeliveryAttempt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryAttempt")
            .field("transport", &self.transport.name())
            .field("policy", &self.policy)
            .field("recipient", &self.masked)
            .finish_non_exhaustive()
    }
}

impl<'a> DeliveryAttempt<'a> {
    /// Prepare a delivery. Nothing is sent until [`DeliveryAttempt::run`].
    pub fn new(
        transport: &'a dyn SmsTransport,
        pause: &'a dyn Pause,
        policy: RetryPolicy,
        recipient: &'a str,
        body: &'a str,
    ) -> Self {
        Self {
            transport,
            pause,
            policy,
            recipient,
            masked: mask_recipient(recipient),
            body,
        }
    }

    /// Drive the machine from `Idle` to a terminal state.
    pub async fn run(self) -> AttemptOutcome {
        let mut state = AttemptState::Idle;
        loop {
            state = match self.step(state).await {
                AttemptState::Succeeded { attempt, receipt } => {
                    return AttemptOutcome::Succeeded {
                        receipt,
                        attempts: attempt.saturating_add(1),
                    };
                }
                AttemptState::Failed { attempt, error } => {
                    return AttemptOutcome::Failed {
                        error,
                        attempts: attempt.saturating_add(1),
                    };
                }
                next => next,
            };
        }
    }

    /// Perform one transition.
    pub async fn step(&self, state: AttemptState) -> AttemptState {
        match state {
            AttemptState::Idle => {
                info!(
                    recipient = %self.masked,
                    attempt = 1,
                    transport = self.transport.name(),
                    max_attempts = self.policy.max_attempts,
                    "delivery started"
                );
                AttemptState::Attempting { attempt: 0 }
            }
            AttemptState::Attempting { attempt } => self.attempt(attempt).await,
            AttemptState::Retrying { attempt } => {
                let next = attempt.saturating_add(1);
                info!(
                    recipient = %self.masked,
                    attempt = next.saturating_add(1),
                    backoff_ms = u64::try_from(self.policy.backoff.as_millis()).unwrap_or(u64::MAX),
                    "waiting before retry"
                );
                self.pause.pause(self.policy.backoff).await;
                AttemptState::Attempting { attempt: next }
            }
            terminal @ (AttemptState::Succeeded { .. } | AttemptState::Failed { .. }) => terminal,
        }
    }

    async fn attempt(&self, attempt: u32) -> AttemptState {
        let number = attempt.saturating_add(1);
        match self.transport.send(self.recipient, self.body).await {
            Ok(receipt) => {
                info!(
                    recipient = %self.masked,
                    attempt = number,
                    message_id = %receipt.id,
                    "SMS sent"
                );
                AttemptState::Succeeded { attempt, receipt }
            }
            Err(error) => {
                self.log_failure(number, &error);
                let last = self.policy.max_attempts.saturating_sub(1);
                if attempt < last {
                    AttemptState::Retrying { attempt }
                } else {
                    error!(
                        recipient = %self.masked,
                        attempts = number,
                        "failed to send SMS, retry budget exhausted"
                    );
                    AttemptState::Failed { attempt, error }
                }
            }
        }
    }

    fn log_failure(&self, number: u32, error: &TransportError) {
        // Provider bodies often quote the number back.
        let detail = mask_recipient_in(&error.to_string(), self.recipient);
        match error.class() {
            FailureClass::Response => warn!(
                recipient = %self.masked,
                attempt = number,
                status = error.status(),
                error = %detail,
                "send failed: server responded with error status"
            ),
            FailureClass::NoResponse => warn!(
                recipient = %self.masked,
                attempt = number,
                error = %detail,
                "send failed: no response received"
            ),
            FailureClass::Other => warn!(
                recipient = %self.masked,
                attempt = number,
                error = %detail,
                "send failed"
            ),
        }
    }
}
