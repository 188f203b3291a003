//! Channel Relay - Telegram channel forwarding bot
//!
//! Watches source channels, keeps posts that carry the required link and a
//! valid marker, rewrites them and republishes them to destination channels.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `relay` - Filter, transform and dispatch pipeline with the dedup set
//! - `bot` - Telegram transport (with Throttle for API rate limiting) and health endpoint
//! - `events` - Channel post handlers

mod bot;
mod config;
mod events;
mod relay;

use std::sync::Arc;

use anyhow::Context;
use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot::{Health, TelegramOutbound};
use config::Config;
use relay::Relay;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("channel_relay=info,teloxide=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting channel relay...");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");
    info!("Bot mode: {:?}", config.bot_mode);
    info!("Sources: {:?}", config.routes.sources);
    info!("Destinations: {:?}", config.routes.destinations);
    info!(
        "Style: {:?}, QR: {}, dedup: {:?}",
        config.transform.style,
        config.transform.qr.is_some(),
        config.dispatch.policy
    );

    // Initialize bot with Throttle for automatic rate limiting
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());
    info!("Bot initialized with rate limiting (Throttle)");

    let outbound = Arc::new(TelegramOutbound::new(bot.clone()));
    let relay = Arc::new(
        Relay::new(
            config.rules.clone(),
            config.transform.clone(),
            config.dispatch.clone(),
            config.routes.clone(),
            outbound,
        )
        .context("Failed to build relay pipeline")?,
    );
    let health = Health::new(relay.dedup().clone());

    // Authentication failure is fatal; the supervisor restarts the process.
    let me = bot.get_me().await.context("Failed to authenticate with Telegram")?;
    health.set_authenticated(true);
    info!("Bot username: @{}", me.username());

    let dispatcher = bot::build_dispatcher(bot.clone(), relay, health.clone());

    bot::run(&config, dispatcher, bot, health).await
}
