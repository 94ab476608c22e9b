//! Configuration loading and validation.
//!
//! Loads configuration from `./sms-scheduler.toml` (or `$SMS_SCHEDULER_CONFIG`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::delay::{DelayPolicy, SchedulingMode};
use crate::dispatch::RetryPolicy;
use crate::logging::LogTarget;
use crate::messages::SelectionMode;

/// Env var naming an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "SMS_SCHEDULER_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "sms-scheduler.toml";

/// Prefix of the numbered recipient variables (`PHONE_NUMBER_1`, `PHONE_NUMBER_2`, ...).
pub const RECIPIENT_ENV_PREFIX: &str = "PHONE_NUMBER_";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Selection, scheduling and recipients.
    pub dispatch: DispatchConfig,
    /// Delivery retry budget.
    pub retry: RetryConfig,
    /// Carrier transport settings.
    pub transport: TransportConfig,
    /// Filesystem locations for state and logs.
    pub paths: PathsConfig,
    /// Log routing.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Nothing is logged here since logging is configured from the result;
    /// pass the returned [`LoadReport`] to [`LoadReport::log`] once it is up.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed, or if the resolved values fail [`Config::validate`].
    pub fn load() -> Result<(Self, LoadReport)> {
        let env = |key: &str| std::env::var(key).ok();
        let path = config_path_with(env);
        let file = Self::read_file(&path)?;
        let file_found = file.is_some();
        let mut config = file.unwrap_or_default();
        let ignored_overrides = config.apply_overrides(env);
        config.validate()?;
        Ok((
            config,
            LoadReport {
                path,
                file_found,
                ignored_overrides,
            },
        ))
    }

    /// Load from a TOML file only, no env overrides.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Ok(Self::read_file(path)?.unwrap_or_default())
    }

    fn read_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents)
                .map(Some)
                .with_context(|| format!("failed to parse config at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrong value types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process env.
    /// Returns the `(variable, value)` pairs that failed to parse; those
    /// leave the current value in place.
    pub fn apply_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Vec<(String, String)> {
        let mut ignored = Vec::new();

        if let Some(v) = env("ENVIRONMENT") {
            self.logging.target = match v.parse() {
                Ok(LogTarget::Local) => LogTarget::Local,
                _ => LogTarget::Hosted,
            };
        }

        let recipients = numbered_recipients(&env);
        if !recipients.is_empty() {
            self.dispatch.recipients = recipients;
        }

        let dispatch = &mut self.dispatch;
        override_parsed(&env, "SMS_SELECTION_MODE", &mut dispatch.selection, &mut ignored);
        override_parsed(&env, "SMS_SCHEDULING_MODE", &mut dispatch.scheduling, &mut ignored);
        override_parsed(&env, "SMS_MIN_DELAY_SECS", &mut dispatch.min_delay_secs, &mut ignored);
        override_parsed(&env, "SMS_MAX_DELAY_SECS", &mut dispatch.max_delay_secs, &mut ignored);
        override_parsed(&env, "SMS_MAX_ATTEMPTS", &mut self.retry.max_attempts, &mut ignored);
        override_parsed(&env, "SMS_RETRY_BACKOFF_MS", &mut self.retry.backoff_ms, &mut ignored);

        if let Some(v) = env("SMS_CURSOR_PATH") {
            self.paths.cursor = PathBuf::from(v);
        }
        if let Some(v) = env("SMS_MESSAGES_PATH") {
            self.paths.messages = PathBuf::from(v);
        }

        ignored
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error when the delay bounds are inverted or the retry
    /// budget allows zero attempts.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.min_delay_secs > self.dispatch.max_delay_secs {
            anyhow::bail!(
                "min_delay_secs ({}) must not exceed max_delay_secs ({})",
                self.dispatch.min_delay_secs,
                self.dispatch.max_delay_secs
            );
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Delay policy built from the configured bounds.
    pub fn delay_policy(&self) -> DelayPolicy {
        DelayPolicy::new(self.dispatch.min_delay_secs, self.dispatch.max_delay_secs)
    }

    /// Retry policy built from the configured budget.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
        }
    }
}

/// Resolve the config file path using a custom env resolver.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    env(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Collect `PHONE_NUMBER_1`, `PHONE_NUMBER_2`, ... until the first gap.
fn numbered_recipients(env: &impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut recipients = Vec::new();
    for n in 1_u32.. {
        let Some(value) = env(&format!("{RECIPIENT_ENV_PREFIX}{n}")) else {
            break;
        };
        if !value.trim().is_empty() {
            recipients.push(value);
        }
    }
    recipients
}

fn override_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
    ignored: &mut Vec<(String, String)>,
) {
    if let Some(v) = env(key) {
        match v.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => ignored.push((key.to_owned(), v)),
        }
    }
}

/// What happened while resolving configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Config file that was consulted.
    pub path: PathBuf,
    /// Whether that file existed.
    pub file_found: bool,
    /// Env overrides that failed to parse, as `(variable, value)`.
    pub ignored_overrides: Vec<(String, String)>,
}

impl LoadReport {
    /// Emit the report through `tracing`.
    pub fn log(&self) {
        if self.file_found {
            tracing::info!(path = %self.path.display(), "loaded config from file");
        } else {
            tracing::info!(path = %self.path.display(), "no config file found, using defaults");
        }
        for (var, value) in &self.ignored_overrides {
            tracing::warn!(var, value, "ignoring invalid env override");
        }
    }
}

// ── Dispatch ────────────────────────────────────────────────────

/// Message selection, scheduling and recipient settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How the next message body is chosen.
    pub selection: SelectionMode,
    /// Whether sends are jittered by the delay policy.
    pub scheduling: SchedulingMode,
    /// Lower delay bound in seconds (inclusive).
    pub min_delay_secs: u64,
    /// Upper delay bound in seconds (inclusive).
    pub max_delay_secs: u64,
    /// Phone numbers receiving scheduled runs.
    pub recipients: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            selection: SelectionMode::Rotating,
            scheduling: SchedulingMode::Delayed,
            min_delay_secs: 0,
            max_delay_secs: 180,
            recipients: Vec::new(),
        }
    }
}

// ── Retry ───────────────────────────────────────────────────────

/// Bounded retry budget for one delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Transport calls allowed per dispatch.
    pub max_attempts: u32,
    /// Fixed wait between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 5_000,
        }
    }
}

// ── Transport ───────────────────────────────────────────────────

/// Twilio REST transport settings.
///
/// Secrets are never stored here, only the credential key names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// API origin, overridable for tests and proxies.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Credential key holding the account SID.
    pub account_sid_key: String,
    /// Credential key holding the auth token.
    pub auth_token_key: String,
    /// Credential key holding the sender number.
    pub from_number_key: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twilio.com".to_owned(),
            timeout_secs: 30,
            account_sid_key: "TWILIO_ACCOUNT_SID".to_owned(),
            auth_token_key: "TWILIO_AUTH_TOKEN".to_owned(),
            from_number_key: "TWILIO_PHONE_NUMBER".to_owned(),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────

/// Filesystem locations, relative to the working directory unless absolute.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// TOML file holding the message pool.
    pub messages: PathBuf,
    /// File holding the rotation cursor.
    pub cursor: PathBuf,
    /// Directory for rotated log files (local target only).
    pub logs_dir: PathBuf,
    /// Optional `.env` credentials file.
    pub env_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            messages: PathBuf::from("messages.toml"),
            cursor: PathBuf::from(".sms-cursor"),
            logs_dir: PathBuf::from("logs"),
            env_file: PathBuf::from(".env"),
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

/// Log routing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Where logs go.
    pub target: LogTarget,
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::Hosted,
            level: "info".to_owned(),
        }
    }
}
