//! Dispatch orchestration.
//!
//! Per recipient: select message, validate recipient, optionally wait out a
//! jitter delay, run the delivery state machine, and advance the rotation
//! cursor only after a confirmed send.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::delay::{DelayPolicy, Pause, SchedulingMode};
use crate::messages::{IndexCursor, MessagePool, Selection, SelectionMode};
use crate::phone;
use crate::redactor::mask_recipient;
use crate::transport::{SendReceipt, SmsTransport};

use super::{AttemptOutcome, DeliveryAttempt, DispatchError, DispatchResult, RetryPolicy};

/// Policies resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// How messages are chosen.
    pub selection: SelectionMode,
    /// Whether sends are jittered.
    pub scheduling: SchedulingMode,
    /// Jitter bounds.
    pub delay: DelayPolicy,
    /// Retry budget.
    pub retry: RetryPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            selection: SelectionMode::Rotating,
            scheduling: SchedulingMode::Delayed,
            delay: DelayPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchSettings {
    /// Settings taken from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            selection: config.dispatch.selection,
            scheduling: config.dispatch.scheduling,
            delay: config.delay_policy(),
            retry: config.retry_policy(),
        }
    }
}

/// Runs dispatches against an injected transport and pause.
pub struct Dispatcher {
    transport: Arc<dyn SmsTransport>,
    pause: Arc<dyn Pause>,
    settings: DispatchSettings,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.transport.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        transport: Arc<dyn SmsTransport>,
        pause: Arc<dyn Pause>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            transport,
            pause,
            settings,
        }
    }

    /// Deliver one pool message to one recipient.
    ///
    /// With rotating selection the cursor advances after a confirmed send.
    pub async fn dispatch(
        &self,
        pool: &MessagePool,
        cursor: &dyn IndexCursor,
        recipient: &str,
    ) -> DispatchResult {
        let selection = pool.pick(self.settings.selection, cursor);
        debug!(index = selection.index, mode = ?selection.mode, "message selected");

        let result = DispatchResult::from(self.deliver(recipient, &selection.body).await);
        if result.success {
            self.advance_cursor(pool, cursor, &selection);
        }
        result
    }

    /// Scheduled run: one message for every recipient.
    ///
    /// Each recipient is an independent dispatch with its own validation,
    /// delay and retries. The cursor advances once if any of them succeeded.
    pub async fn run_scheduled(
        &self,
        pool: &MessagePool,
        cursor: &dyn IndexCursor,
        recipients: &[String],
    ) -> Vec<DispatchResult> {
        if recipients.is_empty() {
            warn!("no recipients configured, nothing to dispatch");
            return Vec::new();
        }

        let selection = pool.pick(self.settings.selection, cursor);
        info!(
            index = selection.index,
            mode = ?selection.mode,
            recipients = recipients.len(),
            "scheduled run started"
        );

        let mut results = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let result = DispatchResult::from(self.deliver(recipient, &selection.body).await);
            results.push(result);
        }

        let sent = results.iter().filter(|r| r.success).count();
        info!(
            sent,
            failed = results.len().saturating_sub(sent),
            "scheduled run finished"
        );
        if sent > 0 {
            self.advance_cursor(pool, cursor, &selection);
        }
        results
    }

    /// On-demand send of an explicit body; the pool and cursor are untouched.
    pub async fn send_message(&self, recipient: &str, body: &str) -> DispatchResult {
        DispatchResult::from(self.deliver(recipient, body).await)
    }

    /// Validate, optionally delay, then run the delivery state machine.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidRecipient`] before any wait or send,
    /// or [`DispatchError::DeliveryFailed`] once the retry budget is spent.
    pub async fn deliver(&self, recipient: &str, body: &str) -> Result<SendReceipt, DispatchError> {
        let masked = mask_recipient(recipient);
        if !phone::is_valid(recipient) {
            warn!(recipient = %masked, "invalid phone number, skipping delivery");
            return Err(DispatchError::InvalidRecipient { masked });
        }

        if self.settings.scheduling == SchedulingMode::Delayed {
            let delay = self.settings.delay.compute_delay();
            info!(recipient = %masked, delay_secs = delay.as_secs(), "delaying send");
            self.pause.pause(delay).await;
        }

        let attempt = DeliveryAttempt::new(
            self.transport.as_ref(),
            self.pause.as_ref(),
            self.settings.retry,
            recipient,
            body,
        );
        match attempt.run().await {
            AttemptOutcome::Succeeded { receipt, .. } => Ok(receipt),
            AttemptOutcome::Failed { error, attempts } => Err(DispatchError::DeliveryFailed {
                attempts,
                last_error: error,
            }),
        }
    }

    fn advance_cursor(&self, pool: &MessagePool, cursor: &dyn IndexCursor, selection: &Selection) {
        if !selection.advances_cursor() {
            return;
        }
        let next = pool.next_after(selection);
        match cursor.write(next) {
            Ok(()) => debug!(from = selection.index, to = next, "cursor advanced"),
            Err(e) => warn!(
                error = %e,
                next,
                "failed to persist cursor, the next run may repeat this message"
            ),
        }
    }
}
