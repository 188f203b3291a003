//! Fan-out of a transformed post to the destination channels.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::dedup::{DedupPolicy, DedupSet};
use super::message::MessageKey;
use super::transform::TransformResult;

/// Telegram chat identifier of a destination.
pub type ChannelId = i64;

/// Telegram's caption limit, in UTF-16 code units.
pub const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),

    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Outbound half of the messaging client.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, channel: ChannelId, text: &str, link_preview: bool) -> Result<(), SendError>;

    async fn send_image(&self, channel: ChannelId, png: &[u8], caption: &str) -> Result<(), SendError>;
}

/// How a successful delivery went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentAs {
    Image,
    Text,
    /// The image could not be used, the text went out instead.
    TextFallback,
}

#[derive(Debug)]
pub struct Delivery {
    pub destination: ChannelId,
    pub outcome: Result<SentAs, SendError>,
}

/// Per-destination outcomes for one post, in destination order.
#[derive(Debug)]
pub struct DispatchReport {
    pub key: MessageKey,
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.deliveries.iter().filter(|d| d.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.succeeded()
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Link previews on text sends.
    pub link_preview: bool,
    /// Pause between two destinations.
    pub send_delay: Duration,
    pub policy: DedupPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            link_preview: false,
            send_delay: Duration::from_secs(1),
            policy: DedupPolicy::FirstSuccess,
        }
    }
}

pub struct Dispatcher<O: ?Sized> {
    settings: DispatchSettings,
    outbound: std::sync::Arc<O>,
}

impl<O: Outbound + ?Sized> Dispatcher<O> {
    pub fn new(outbound: std::sync::Arc<O>, settings: DispatchSettings) -> Self {
        Self { settings, outbound }
    }

    /// Send `result` to every destination, recording `key` in `dedup` per policy.
    ///
    /// A failing destination never stops the others.
    pub async fn dispatch(
        &self,
        result: &TransformResult,
        key: MessageKey,
        destinations: &[ChannelId],
        dedup: &DedupSet,
    ) -> DispatchReport {
        let mut deliveries = Vec::with_capacity(destinations.len());

        for (i, &destination) in destinations.iter().enumerate() {
            if i > 0 && !self.settings.send_delay.is_zero() {
                tokio::time::sleep(self.settings.send_delay).await;
            }

            let outcome = self.deliver(result, destination).await;
            match &outcome {
                Ok(sent) => {
                    info!("Forwarded {} to {} ({:?})", key, destination, sent);
                    if self.settings.policy == DedupPolicy::FirstSuccess && !dedup.contains(&key) {
                        dedup.mark_done(key);
                    }
                }
                Err(e) => warn!("Failed to forward {} to {}: {}", key, destination, e),
            }
            deliveries.push(Delivery { destination, outcome });
        }

        if self.settings.policy == DedupPolicy::AfterAttempt {
            dedup.mark_done(key);
        }

        DispatchReport { key, deliveries }
    }

    async fn deliver(&self, result: &TransformResult, destination: ChannelId) -> Result<SentAs, SendError> {
        let Some(png) = &result.attachment else {
            return self.send_text(destination, &result.text).await.map(|_| SentAs::Text);
        };

        if result.text.encode_utf16().count() > CAPTION_LIMIT {
            debug!("Caption too long for {}, sending text only", destination);
            return self.send_text(destination, &result.text).await.map(|_| SentAs::TextFallback);
        }

        match self.outbound.send_image(destination, png, &result.text).await {
            Ok(()) => Ok(SentAs::Image),
            Err(e) => {
                warn!("Image send to {} failed ({}), falling back to text", destination, e);
                self.send_text(destination, &result.text)
                    .await
                    .map(|_| SentAs::TextFallback)
            }
        }
    }

    async fn send_text(&self, destination: ChannelId, text: &str) -> Result<(), SendError> {
        self.outbound
            .send_text(destination, text, self.settings.link_preview)
            .await
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::fake::{RecordingOutbound, Sent};
    use super::*;

    fn result(text: &str, attachment: bool) -> TransformResult {
        TransformResult {
            text: text.to_string(),
            link: None,
            answer: "N/A".into(),
            attachment: attachment.then(|| vec![1, 2, 3]),
        }
    }

    fn dispatcher(outbound: Arc<RecordingOutbound>, policy: DedupPolicy) -> Dispatcher<RecordingOutbound> {
        Dispatcher::new(
            outbound,
            DispatchSettings {
                policy,
                ..DispatchSettings::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_block_others() {
        let outbound = Arc::new(RecordingOutbound::failing(&[2]));
        let dedup = DedupSet::new();
        let key = MessageKey::new(-1, 10);

        let report = dispatcher(outbound.clone(), DedupPolicy::FirstSuccess)
            .dispatch(&result("hi", false), key, &[1, 2, 3], &dedup)
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(report.deliveries[1].outcome.is_err());
        assert!(report.deliveries[0].outcome.is_ok() && report.deliveries[2].outcome.is_ok());
        assert!(dedup.contains(&key));
        assert_eq!(outbound.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_skips_mark_when_all_fail() {
        let outbound = Arc::new(RecordingOutbound::failing(&[1, 2]));
        let dedup = DedupSet::new();
        let key = MessageKey::new(-1, 11);

        let report = dispatcher(outbound, DedupPolicy::FirstSuccess)
            .dispatch(&result("hi", false), key, &[1, 2], &dedup)
            .await;

        assert_eq!(report.succeeded(), 0);
        assert!(!dedup.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_attempt_marks_even_on_failure() {
        let outbound = Arc::new(RecordingOutbound::failing(&[1]));
        let dedup = DedupSet::new();
        let key = MessageKey::new(-1, 12);

        dispatcher(outbound, DedupPolicy::AfterAttempt)
            .dispatch(&result("hi", false), key, &[1], &dedup)
            .await;

        assert!(dedup.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_with_caption_and_fallback() {
        let outbound = Arc::new(RecordingOutbound::default());
        let dedup = DedupSet::new();
        let d = dispatcher(outbound.clone(), DedupPolicy::FirstSuccess);

        let report = d
            .dispatch(&result("cap", true), MessageKey::new(-1, 1), &[5], &dedup)
            .await;
        assert!(matches!(report.deliveries[0].outcome, Ok(SentAs::Image)));
        assert_eq!(outbound.sent(), vec![Sent::Image { channel: 5, caption: "cap".into() }]);

        let broken = Arc::new(RecordingOutbound {
            failing_images: true,
            ..RecordingOutbound::default()
        });
        let report = dispatcher(broken.clone(), DedupPolicy::FirstSuccess)
            .dispatch(&result("cap", true), MessageKey::new(-1, 2), &[5], &dedup)
            .await;
        assert!(matches!(report.deliveries[0].outcome, Ok(SentAs::TextFallback)));
        assert_eq!(
            broken.sent(),
            vec![Sent::Text { channel: 5, text: "cap".into(), link_preview: false }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_caption_goes_out_as_text() {
        let outbound = Arc::new(RecordingOutbound::default());
        let long = "a".repeat(CAPTION_LIMIT + 1);

        let report = dispatcher(outbound.clone(), DedupPolicy::FirstSuccess)
            .dispatch(&result(&long, true), MessageKey::new(-1, 3), &[9], &DedupSet::new())
            .await;

        assert!(matches!(report.deliveries[0].outcome, Ok(SentAs::TextFallback)));
        assert!(matches!(outbound.sent()[0], Sent::Text { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_destinations_only() {
        let outbound = Arc::new(RecordingOutbound::default());
        let start = tokio::time::Instant::now();

        dispatcher(outbound, DedupPolicy::FirstSuccess)
            .dispatch(&result("x", false), MessageKey::new(-1, 4), &[1, 2, 3], &DedupSet::new())
            .await;

        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
