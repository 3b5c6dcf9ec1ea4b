//! courier: command-line front end for the notification service.
//!
//! # Usage
//!
//! ```bash
//! courier create --type email --recipient a@example.com --subject Hi --content "Hello"
//! courier get 1
//! courier --output json recent
//! courier update 1 --subject Updated --content "New body"
//! courier delete 1
//! ```
//!
//! Environment variables can also be used:
//! - `COURIER_DATA_DIR`: Data directory for SQLite
//! - `COURIER_CACHE_BACKEND`: `memory` or `redis`
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier::app::App;
use courier::config::Config;
use courier::observability::metrics::init_metrics_with_endpoint;
use courier::observability::tracing::init_tracing;
use std::process::ExitCode;

/// Courier: notifications with cache-aside reads and lock-guarded cache rebuilds.
#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a notification
    Create {
        /// Notification type (EMAIL or SMS)
        #[arg(short = 't', long = "type")]
        kind: String,
        /// Recipient address or phone number
        #[arg(short, long)]
        recipient: String,
        /// Subject line
        #[arg(short, long)]
        subject: Option<String>,
        /// Message body
        #[arg(short, long)]
        content: String,
    },
    /// Show a notification by id
    Get {
        /// Notification id
        id: i64,
    },
    /// List the most recent notifications
    Recent,
    /// Replace a notification's subject and content
    Update {
        /// Notification id
        id: i64,
        /// New subject (omit to clear)
        #[arg(short, long)]
        subject: Option<String>,
        /// New message body
        #[arg(short, long)]
        content: String,
    },
    /// Delete a notification
    Delete {
        /// Notification id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(&cli.config.log_level, cli.config.log_format);
    init_metrics_with_endpoint(cli.config.otel_endpoint.as_deref());

    let app = App::build(&cli.config)
        .await
        .context("failed to start courier")?;

    let result = run(&app, cli.command, cli.output).await;

    // Background cache maintenance and events finish before exit.
    app.shutdown().await;

    let found = result?;
    Ok(if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run one command. `Ok(false)` means the target did not exist.
async fn run(app: &App, command: Commands, output: OutputFormat) -> Result<bool> {
    let service = app.service();
    match command {
        Commands::Create {
            kind,
            recipient,
            subject,
            content,
        } => commands::create(service, &kind, recipient, subject, content, output).await,
        Commands::Get { id } => commands::get(service, id, output).await,
        Commands::Recent => commands::recent(service, output).await,
        Commands::Update {
            id,
            subject,
            content,
        } => commands::update(service, id, subject, content, output).await,
        Commands::Delete { id } => commands::delete(service, id, output).await,
    }
}
