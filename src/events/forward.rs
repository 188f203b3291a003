//! Channel post handler.
//!
//! Converts Telegram posts into [`InboundMessage`]s and runs them through the
//! relay. Nothing that happens in the pipeline may take the bot down: errors
//! and panics are logged and the post is dropped.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};

use crate::bot::AppState;
use crate::relay::{HandleOutcome, InboundMessage};

/// Only posts from configured source channels reach the relay.
pub fn is_source(msg: Message, state: AppState) -> bool {
    state.relay.is_source(msg.chat.id.0)
}

pub async fn on_channel_post(msg: Message, state: AppState) -> anyhow::Result<()> {
    relay_post(&state, inbound(&msg, false)).await;
    Ok(())
}

pub async fn on_edited_channel_post(msg: Message, state: AppState) -> anyhow::Result<()> {
    relay_post(&state, inbound(&msg, true)).await;
    Ok(())
}

/// Build the pipeline's view of a Telegram message.
pub fn inbound(msg: &Message, edited: bool) -> InboundMessage {
    let has_media = msg.photo().is_some()
        || msg.video().is_some()
        || msg.animation().is_some()
        || msg.document().is_some()
        || msg.audio().is_some()
        || msg.voice().is_some()
        || msg.video_note().is_some()
        || msg.sticker().is_some();

    InboundMessage {
        id: msg.id.0,
        source_chat_id: msg.chat.id.0,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        has_media,
        edited,
    }
}

async fn relay_post(state: &AppState, msg: InboundMessage) {
    state.health.record_update();
    let key = msg.key();

    debug!(
        "Post {}: '{}'",
        key,
        msg.text_or_empty().chars().take(30).collect::<String>()
    );

    match AssertUnwindSafe(state.relay.handle(&msg)).catch_unwind().await {
        Ok(HandleOutcome::Dispatched(report)) => {
            if report.failed() == 0 {
                info!("Post {} delivered to {} destination(s)", key, report.succeeded());
            } else {
                let failed: Vec<_> = report
                    .deliveries
                    .iter()
                    .filter(|d| d.outcome.is_err())
                    .map(|d| d.destination)
                    .collect();
                warn!(
                    "Post {} partially delivered: {} ok, failed for {:?}",
                    report.key,
                    report.succeeded(),
                    failed
                );
            }
        }
        Ok(HandleOutcome::Rejected(reason)) => debug!("Post {} not forwarded: {}", key, reason),
        Ok(HandleOutcome::Duplicate | HandleOutcome::SkippedMedia) => {}
        Err(panic) => error!("Relay panicked on post {}: {}", key, panic_message(&*panic)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
