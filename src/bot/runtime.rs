//! Bot runtime - Polling and Webhook runners.

use tracing::{error, info};

use super::dispatcher::{RelayDispatcher, ThrottledBot};
use super::health::{self, Health};
use super::webhook;
use crate::config::{BotMode, Config};

/// Run the bot with the configured mode.
///
/// Automatically selects between polling and webhook based on config.
pub async fn run(
    config: &Config,
    mut dispatcher: RelayDispatcher,
    bot: ThrottledBot,
    health: Health,
) -> anyhow::Result<()> {
    match (&config.bot_mode, &config.webhook) {
        (BotMode::Webhook, Some(webhook)) => {
            info!("Starting bot in webhook mode...");
            webhook::start_webhook(webhook, dispatcher, bot, health).await
        }
        _ => {
            info!("Starting bot in polling mode...");
            if config.health_port != 0 {
                let port = config.health_port;
                tokio::spawn(async move {
                    if let Err(e) = health::serve(port, health).await {
                        error!("Health endpoint stopped: {:#}", e);
                    }
                });
            }
            dispatcher.dispatch().await;
            Ok(())
        }
    }
}
