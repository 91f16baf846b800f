//! Storefront Chat - live support chat for a storefront backend
//!
//! A terminal client for the shopper and admin sides of the chat.

mod api;
mod auth;
mod chat;
mod config;
mod models;
mod stomp;
mod tui;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::models::ParticipantId;

#[derive(Parser)]
#[command(name = "storefront-chat")]
#[command(about = "Terminal client for storefront live chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the bearer token issued by the storefront backend
    Login {
        /// Access token
        #[arg(short, long)]
        token: String,

        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<u64>,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// List the admin's conversations
    Users,

    /// Print the history between a shopper and the admin
    History {
        /// Shopper id
        user_id: ParticipantId,
    },

    /// Send a message
    Send {
        /// Shopper id; sends as the admin when given
        #[arg(short, long)]
        to: Option<ParticipantId>,

        /// Message content
        message: String,
    },

    /// Print incoming messages until interrupted
    Listen {
        /// Listen as the admin
        #[arg(long)]
        admin: bool,
    },

    /// Launch the terminal user interface
    Chat {
        /// Open the admin surface
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. The TUI owns the terminal, so its logs go to the
    // in-app debug pane instead of stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        || tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let log_buffer = tui::LogBuffer::new();
    if matches!(cli.command, Commands::Chat { .. }) {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(log_buffer.clone()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Login { token, expires_in } => {
            auth::login(config_path, &token, expires_in).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(config_path).await?;
        }
        Commands::Status => {
            auth::status(config_path).await?;
        }
        Commands::Users => {
            let config = Config::load(config_path)?;
            api::list_users(&config).await?;
        }
        Commands::History { user_id } => {
            let config = Config::load(config_path)?;
            api::show_history(&config, user_id).await?;
        }
        Commands::Send { to, message } => {
            let config = Config::load(config_path)?;
            tracing::info!("Sending message...");
            chat::cli::send_message(&config, to, &message).await?;
        }
        Commands::Listen { admin } => {
            let config = Config::load(config_path)?;
            chat::cli::listen(&config, admin).await?;
        }
        Commands::Chat { admin } => {
            let config = Config::load(config_path)?;
            let handle = chat::cli::open_session(&config, admin)?;
            tui::run(handle, admin, log_buffer).await?;
        }
    }

    Ok(())
}
