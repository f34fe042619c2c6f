mod bot;
mod commands;
mod config;
mod error;
mod handlers;
mod logbridge;
mod server;
mod transport;
mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, RunMode};
use crate::logbridge::{audit_channel, spawn_audit_forwarder, ChatLogger};
use crate::server::AppState;
use crate::transport::{ChatTransport, TelegramTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; audit records are captured until the forwarder starts
    let (audit_layer, audit_rx) = audit_channel();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatlog_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(audit_layer)
        .init();

    // Load configuration: TOML file if present, environment otherwise
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
        Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        info!("No {} found, reading configuration from the environment", config_path.display());
        Config::from_env().context("Failed to load config from the environment")?
    };

    info!("Configuration loaded successfully");
    info!("  Mode: {}", config.server.mode);
    info!("  Admins: {:?}", config.telegram.admin_ids);
    info!(
        "  Admin password: {}",
        if config.server.admin_password.is_some() { "set" } else { "not set" }
    );

    // Forward audit records to the admin chats
    if !config.telegram.admin_ids.is_empty() {
        let audit_transport: Arc<dyn ChatTransport> =
            Arc::new(TelegramTransport::from_token(config.telegram.audit_bot_token()));
        let audit_logger = ChatLogger::new("server", audit_transport, config.telegram.admin_ids.clone());
        spawn_audit_forwarder(audit_rx, audit_logger);
    } else {
        // Nobody to forward to; close the channel so records are not queued
        drop(audit_rx);
    }

    let bot = teloxide::Bot::new(&config.telegram.bot_token);
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));

    match config.server.mode {
        RunMode::Webhook => {
            let state = Arc::new(AppState::new(&config.server, transport));
            info!("Bot is starting in webhook mode...");
            server::serve(state, &config.server.bind_address).await?;
        }
        RunMode::Polling => {
            info!("Bot is starting in polling mode...");
            bot::run(bot, transport).await?;
        }
    }

    Ok(())
}
