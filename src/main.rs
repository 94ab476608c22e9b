//! sms-scheduler CLI entry point.
//!
//! Provides `run`, `send`, `check`, and `cursor` subcommands. `run` is meant
//! to be invoked by an external scheduler (cron, systemd timer, serverless
//! trigger); each invocation is one scheduled window.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use sms_scheduler::config::Config;
use sms_scheduler::credentials::{load_credentials, resolve_twilio_auth, transport_keys};
use sms_scheduler::delay::{SchedulingMode, TokioPause};
use sms_scheduler::dispatch::{DispatchRequest, DispatchSettings, Dispatcher};
use sms_scheduler::logging;
use sms_scheduler::messages::{FileCursor, IndexCursor, MessagePool};
use sms_scheduler::phone;
use sms_scheduler::redactor::mask_recipient;
use sms_scheduler::transport::twilio::TwilioTransport;

/// Scheduled SMS dispatch with bounded retries.
#[derive(Parser)]
#[command(name = "sms-scheduler", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Send the next pool message to every configured recipient.
    Run,
    /// Send an explicit message to one recipient.
    Send {
        /// Recipient phone number.
        #[arg(long, required_unless_present = "json", conflicts_with = "json")]
        to: Option<String>,
        /// Message body.
        #[arg(long, required_unless_present = "json", conflicts_with = "json")]
        message: Option<String>,
        /// Request body as `{"phoneNumber": "...", "message": "..."}`.
        #[arg(long)]
        json: Option<String>,
        /// Skip the jitter delay.
        #[arg(long)]
        immediate: bool,
    },
    /// Check whether a phone number passes validation.
    Check {
        /// Number to validate.
        number: String,
    },
    /// Show the persisted rotation cursor.
    Cursor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, load_report) = Config::load().context("failed to load configuration")?;

    match cli.command {
        Command::Check { number } => handle_check(&number),
        Command::Cursor => handle_cursor(&config),
        Command::Run => {
            let _logging_guard = init_logging(&config)?;
            load_report.log();
            handle_run(&config).await
        }
        Command::Send {
            to,
            message,
            json,
            immediate,
        } => {
            let _logging_guard = init_logging(&config)?;
            load_report.log();
            let request = match json {
                Some(body) => DispatchRequest::from_json(&body)
                    .context("request body must be {\"phoneNumber\", \"message\"}")?,
                None => DispatchRequest {
                    phone_number: to.unwrap_or_default(),
                    message: message.unwrap_or_default(),
                },
            };
            handle_send(&config, request, immediate).await
        }
    }
}

fn init_logging(config: &Config) -> anyhow::Result<logging::LoggingGuard> {
    logging::init(
        config.logging.target,
        &config.paths.logs_dir,
        &config.logging.level,
    )
}

/// Build a dispatcher over the Twilio transport.
fn build_dispatcher(config: &Config, settings: DispatchSettings) -> anyhow::Result<Dispatcher> {
    let mut credentials = load_credentials(&config.paths.env_file)
        .with_context(|| format!("failed to load {}", config.paths.env_file.display()))?;
    credentials.overlay(&transport_keys(&config.transport), |key| {
        std::env::var(key).ok()
    });

    let auth = resolve_twilio_auth(&credentials, &config.transport)
        .context("transport credentials are incomplete")?;
    let transport = TwilioTransport::new(
        &config.transport.base_url,
        auth,
        Duration::from_secs(config.transport.timeout_secs),
    )?
    .with_known_secrets(credentials.known_secrets());

    Ok(Dispatcher::new(
        Arc::new(transport),
        Arc::new(TokioPause),
        settings,
    ))
}

/// Scheduled run over the configured recipients.
async fn handle_run(config: &Config) -> anyhow::Result<()> {
    info!("SMS scheduler started");

    let pool = MessagePool::load(&config.paths.messages)
        .with_context(|| format!("failed to load {}", config.paths.messages.display()))?;
    let cursor = FileCursor::new(config.paths.cursor.clone());
    let dispatcher = build_dispatcher(config, DispatchSettings::from_config(config))?;

    let results = dispatcher
        .run_scheduled(&pool, &cursor, &config.dispatch.recipients)
        .await;
    print_json(&results)?;

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} dispatches failed", results.len());
    }
    Ok(())
}

/// On-demand send of an explicit message.
async fn handle_send(
    config: &Config,
    request: DispatchRequest,
    immediate: bool,
) -> anyhow::Result<()> {
    let mut settings = DispatchSettings::from_config(config);
    if immediate {
        settings.scheduling = SchedulingMode::Immediate;
    }
    let dispatcher = build_dispatcher(config, settings)?;

    let result = dispatcher
        .send_message(&request.phone_number, &request.message)
        .await;
    print_json(&result)?;

    if !result.success {
        anyhow::bail!("{} (status {})", result.message, result.http_status());
    }
    Ok(())
}

fn handle_check(number: &str) -> anyhow::Result<()> {
    if phone::is_valid(number) {
        println!("valid: {}", mask_recipient(number));
        Ok(())
    } else {
        anyhow::bail!("invalid phone number: {}", mask_recipient(number))
    }
}

fn handle_cursor(config: &Config) -> anyhow::Result<()> {
    let cursor = FileCursor::new(config.paths.cursor.clone());
    let index = cursor.read();
    println!("cursor: {index} ({})", cursor.path().display());

    match MessagePool::load(&config.paths.messages) {
        Ok(pool) => {
            let selection = pool.pick_rotating(index);
            println!("next message [{}]: {}", selection.index, selection.body);
        }
        Err(e) => println!("message pool unavailable: {e}"),
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render result")?;
    println!("{rendered}");
    Ok(())
}
