//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two targets:
//! - **Local** ([`LogTarget::Local`]): JSON file layer (daily rotation) + console layer
//! - **Hosted** ([`LogTarget::Hosted`]): console-only, for serverless and container runs

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix for rotated log files.
pub const LOG_FILE_PREFIX: &str = "sms-scheduler.log";

/// Where log output is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Developer machine: rotated files plus stderr.
    Local,
    /// Managed runtime: stderr only, the platform collects it.
    Hosted,
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "hosted" => Ok(Self::Hosted),
            other => Err(format!("unknown log target: {other}")),
        }
    }
}

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file_logging", &self._guard.is_some())
            .finish()
    }
}

/// Initialise logging for the given target.
///
/// `level` is the default filter used when `RUST_LOG` is unset.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init(target: LogTarget, logs_dir: &Path, level: &str) -> anyhow::Result<LoggingGuard> {
    match target {
        LogTarget::Local => init_local(logs_dir, level),
        LogTarget::Hosted => {
            init_hosted(level)?;
            Ok(LoggingGuard { _guard: None })
        }
    }
}

/// Initialise file + console logging.
///
/// Writes JSON logs to `{logs_dir}/sms-scheduler.log.YYYY-MM-DD` with daily
/// rotation. Also emits human-readable output to stderr.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_local(logs_dir: &Path, level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard {
        _guard: Some(guard),
    })
}

/// Initialise console-only logging on stderr.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_hosted(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
