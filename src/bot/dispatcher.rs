//! Update dispatcher setup.
//!
//! Builds the dispatcher with the channel post handlers.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use super::health::Health;
use crate::events;
use crate::relay::Relay;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Dispatcher type shared by the polling and webhook runners.
pub type RelayDispatcher = Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Forwarding pipeline (filter rules, transformer, destinations, dedup set).
    pub relay: Arc<Relay>,

    /// Liveness information served on `/health`.
    pub health: Health,
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(bot: ThrottledBot, relay: Arc<Relay>, health: Health) -> RelayDispatcher {
    let state = AppState { relay, health };

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            tracing::trace!("Ignored update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Error in update handler"))
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry().branch(events::channel_post_handler())
}
