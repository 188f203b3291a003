//! Webhook mode implementation for the bot.
//!
//! Uses teloxide's built-in axum webhook support to:
//! - Automatically call `setWebhook` on Telegram
//! - Serve updates and `/health` from one axum server
//! - Automatically call `deleteWebhook` on shutdown

use std::net::SocketAddr;

use anyhow::Context;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing::{error, info};

use super::dispatcher::{RelayDispatcher, ThrottledBot};
use super::health::{self, Health};
use crate::config::WebhookConfig;

/// Start the bot in webhook mode.
///
/// On shutdown (Ctrl+C), the webhook is automatically deleted.
pub async fn start_webhook(
    config: &WebhookConfig,
    mut dispatcher: RelayDispatcher,
    bot: ThrottledBot,
    health: Health,
) -> anyhow::Result<()> {
    // Server address - listen on all interfaces at the configured port
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));

    let mut options = Options::new(address, config.url.clone());

    // Add secret token if configured for additional security
    if let Some(ref secret) = config.secret {
        options = options.secret_token(secret.clone());
        info!("Webhook secret token configured");
    }

    info!("🔗 Setting webhook URL: {}", config.url);
    info!("📡 Listening on: {}", address);

    // Webhook setup only needs basic API access, so bypass the Throttle adaptor.
    let (listener, stop_flag, router) = webhooks::axum_to_router(bot.inner().clone(), options)
        .await
        .context("Failed to set up webhook")?;

    let app = router.merge(health::router(health));
    let tcp = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp, app).with_graceful_shutdown(stop_flag).await {
            error!("Webhook server error: {}", e);
        }
    });

    info!("✅ Webhook setup complete, waiting for updates...");

    let error_handler = LoggingErrorHandler::with_custom_text("Error from update listener");
    dispatcher
        .dispatch_with_listener(listener, error_handler)
        .await;

    Ok(())
}
