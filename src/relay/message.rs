//! Inbound message model.

use std::fmt;

/// Identity of a channel post. Telegram message ids are only unique per chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub chat_id: i64,
    pub message_id: i32,
}

impl MessageKey {
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self { chat_id, message_id }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

/// A post delivered by the event source.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub id: i32,
    pub source_chat_id: i64,
    /// Message text, or the caption for media posts.
    pub text: Option<String>,
    pub has_media: bool,
    /// Set when the update was an edit of an earlier post.
    pub edited: bool,
}

impl InboundMessage {
    /// Create a plain text post.
    #[cfg(test)]
    pub fn text(source_chat_id: i64, id: i32, text: impl Into<String>) -> Self {
        Self {
            id,
            source_chat_id,
            text: Some(text.into()),
            has_media: false,
            edited: false,
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.source_chat_id, self.id)
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
