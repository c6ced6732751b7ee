mod admission;
mod bus;
mod config;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bus::QueueBus;
use crate::config::Config;
use crate::platform::telegram::TelegramChannel;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Group policy: {}", config.telegram.group_policy);
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);
    info!("  Bus capacity: {}", config.bus.capacity);

    let (bus, receiver) = QueueBus::new(config.bus.capacity);
    let consumer = tokio::spawn(bus::run_consumer(receiver));

    let channel = Arc::new(TelegramChannel::new(config.telegram, Arc::new(bus)));

    info!("Bot is starting...");
    platform::telegram::run(channel).await?;

    // The dispatcher owned the last bus handle; let the consumer drain what is left.
    consumer.await.context("Inbound consumer task failed")?;

    Ok(())
}
