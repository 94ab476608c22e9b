//! sms-scheduler: scheduled text notifications with bounded retries.
//!
//! Picks a message from a pool (random or rotating), validates the
//! recipient, jitters the send time, and delivers through an injected
//! transport with a fixed retry budget.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;

pub mod delay;
pub mod messages;
pub mod phone;
pub mod redactor;

pub mod dispatch;
pub mod transport;
