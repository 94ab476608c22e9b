//! Send-time jitter and the suspension capability used for waits.
//!
//! [`DelayPolicy`] desynchronizes scheduled sends so repeated runs and
//! multiple recipients do not hit the transport at identical timestamps.
//! All waits, jitter and retry backoff alike, go through a [`Pause`] so
//! callers can observe or skip them.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;

/// Whether a dispatch is jittered before its first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// Send straight away.
    Immediate,
    /// Wait a random delay from the [`DelayPolicy`] first.
    Delayed,
}

impl FromStr for SchedulingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "delayed" => Ok(Self::Delayed),
            other => Err(format!("unknown scheduling mode: {other}")),
        }
    }
}

/// Uniform random delay within inclusive second bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    min_secs: u64,
    max_secs: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(0, 180)
    }
}

impl DelayPolicy {
    /// Create a policy; inverted bounds are put back in order.
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs: min_secs.min(max_secs),
            max_secs: max_secs.max(min_secs),
        }
    }

    /// Lower bound in seconds.
    pub fn min_secs(&self) -> u64 {
        self.min_secs
    }

    /// Upper bound in seconds.
    pub fn max_secs(&self) -> u64 {
        self.max_secs
    }

    /// Draw a delay in whole seconds from `[min, max]`.
    pub fn compute_delay_secs(&self) -> u64 {
        self.compute_delay_secs_with(&mut rand::thread_rng())
    }

    /// Draw a delay in whole seconds using the supplied RNG.
    pub fn compute_delay_secs_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.min_secs..=self.max_secs)
    }

    /// Draw a delay as a [`Duration`].
    pub fn compute_delay(&self) -> Duration {
        Duration::from_secs(self.compute_delay_secs())
    }
}

/// Uniform random integer in `[min_secs, max_secs]` inclusive.
pub fn compute_delay(min_secs: u64, max_secs: u64) -> u64 {
    DelayPolicy::new(min_secs, max_secs).compute_delay_secs()
}

/// Cooperative suspension used for jitter and retry backoff.
///
/// The caller stays alive for the whole wait; nothing is detached.
#[async_trait]
pub trait Pause: Send + Sync {
    /// Suspend the current task for `duration`.
    async fn pause(&self, duration: Duration);
}

/// [`Pause`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
