//! Telegram implementation of the outbound send capability.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, LinkPreviewOptions};

use super::dispatcher::ThrottledBot;
use crate::relay::{ChannelId, Outbound, SendError};

/// Sends through the throttled bot so Telegram's flood limits are respected.
pub struct TelegramOutbound {
    bot: ThrottledBot,
}

impl TelegramOutbound {
    pub fn new(bot: ThrottledBot) -> Self {
        Self { bot }
    }
}

fn disabled_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send_text(&self, channel: ChannelId, text: &str, link_preview: bool) -> Result<(), SendError> {
        if text.trim().is_empty() {
            return Err(SendError::Rejected("message text is empty".to_string()));
        }
        let mut req = self.bot.send_message(ChatId(channel), text);
        if !link_preview {
            req = req.link_preview_options(disabled_preview());
        }
        req.await?;
        Ok(())
    }

    async fn send_image(&self, channel: ChannelId, png: &[u8], caption: &str) -> Result<(), SendError> {
        let photo = InputFile::memory(png.to_vec()).file_name("qr.png");
        let mut req = self.bot.send_photo(ChatId(channel), photo);
        if !caption.is_empty() {
            req = req.caption(caption);
        }
        req.await?;
        Ok(())
    }
}
