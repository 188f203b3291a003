//! Forwarding pipeline.
//!
//! ## Flow
//!
//! inbound post → dedup claim → [`filter`] → [`transform`] → [`dispatch`]
//!
//! Every stage except dispatch is pure. [`Relay`] owns the configuration and
//! the dedup state so independent instances can coexist (tests, multiple bots).

pub mod dedup;
pub mod dispatch;
pub mod filter;
pub mod message;
pub mod qr;
pub mod transform;

use std::sync::Arc;

use tracing::{debug, info};

pub use dedup::{DedupPolicy, DedupSet};
pub use dispatch::{ChannelId, DispatchReport, DispatchSettings, Dispatcher, Outbound, SendError};
pub use filter::{FilterRules, RejectReason, Verdict};
pub use message::InboundMessage;
pub use transform::{ForwardStyle, TransformSettings, Transformer};

/// What happened to one inbound post.
#[derive(Debug)]
pub enum HandleOutcome {
    /// Already forwarded, or being handled right now.
    Duplicate,
    SkippedMedia,
    Rejected(RejectReason),
    Dispatched(DispatchReport),
}

/// Routing configuration.
#[derive(Debug, Clone)]
pub struct Routes {
    pub sources: Vec<i64>,
    pub destinations: Vec<ChannelId>,
    /// Ignore posts carrying media.
    pub skip_media: bool,
}

/// The forwarding pipeline for one bot.
pub struct Relay {
    rules: FilterRules,
    transformer: Transformer,
    dispatcher: Dispatcher<dyn Outbound>,
    routes: Routes,
    dedup: DedupSet,
}

impl Relay {
    pub fn new(
        rules: FilterRules,
        transform: TransformSettings,
        dispatch: DispatchSettings,
        routes: Routes,
        outbound: Arc<dyn Outbound>,
    ) -> Result<Self, regex::Error> {
        let transformer = Transformer::new(&rules, transform)?;
        Ok(Self {
            rules,
            transformer,
            dispatcher: Dispatcher::new(outbound, dispatch),
            routes,
            dedup: DedupSet::new(),
        })
    }

    pub fn is_source(&self, chat_id: i64) -> bool {
        self.routes.sources.contains(&chat_id)
    }

    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// Run one post through the pipeline.
    pub async fn handle(&self, msg: &InboundMessage) -> HandleOutcome {
        let key = msg.key();

        let Some(_claim) = self.dedup.claim(key) else {
            debug!("Skipping {}: already forwarded or in flight", key);
            return HandleOutcome::Duplicate;
        };

        if msg.has_media && self.routes.skip_media {
            debug!("Skipping {}: media post", key);
            return HandleOutcome::SkippedMedia;
        }

        let text = msg.text_or_empty();
        if let Verdict::Reject(reason) = self.rules.evaluate(text) {
            debug!("Rejected {}: {}", key, reason);
            return HandleOutcome::Rejected(reason);
        }

        let result = self.transformer.transform(text);
        info!(
            "Relaying {}{} (link: {}, qr: {})",
            key,
            if msg.edited { " [edited]" } else { "" },
            result.link.as_deref().unwrap_or("-"),
            result.attachment.is_some()
        );

        let report = self
            .dispatcher
            .dispatch(&result, key, &self.routes.destinations, &self.dedup)
            .await;
        HandleOutcome::Dispatched(report)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::dispatch::fake::{RecordingOutbound, Sent};
    use super::message::MessageKey;
    use super::*;

    const SOURCE: i64 = -1001;
    const SCENARIO: &str = "DOGE Answer: 42\n#square\nhttps://app.binance.com/uni-qr/cart/12345";

    fn relay(outbound: Arc<RecordingOutbound>, qr: bool) -> Relay {
        let rules = FilterRules::new(
            r"https://app\.binance\.com/uni-qr/cart/\d+",
            vec!["Answer:".into(), "DOGE".into()],
            vec!["box".into()],
            true,
        )
        .unwrap();
        let transform = TransformSettings {
            qr: if qr { TransformSettings::default().qr } else { None },
            ..TransformSettings::default()
        };
        let dispatch = DispatchSettings {
            send_delay: Duration::ZERO,
            ..DispatchSettings::default()
        };
        let routes = Routes {
            sources: vec![SOURCE],
            destinations: vec![-2001, -2002],
            skip_media: true,
        };
        Relay::new(rules, transform, dispatch, routes, outbound).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_forwards_to_every_destination() {
        let outbound = Arc::new(RecordingOutbound::default());
        let relay = relay(outbound.clone(), true);

        let outcome = relay.handle(&InboundMessage::text(SOURCE, 1, SCENARIO)).await;

        let report = match outcome {
            HandleOutcome::Dispatched(report) => report,
            other => panic!("expected dispatch, got {:?}", other),
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(
            outbound.sent(),
            vec![
                Sent::Image { channel: -2001, caption: SCENARIO.into() },
                Sent::Image { channel: -2002, caption: SCENARIO.into() },
            ]
        );
        assert!(relay.dedup().contains(&MessageKey::new(SOURCE, 1)));
    }

    #[tokio::test]
    async fn test_forbidden_word_blocks_forwarding() {
        let outbound = Arc::new(RecordingOutbound::default());
        let relay = relay(outbound.clone(), false);
        let text = SCENARIO.replace("Answer:", "box Answer:");

        let outcome = relay.handle(&InboundMessage::text(SOURCE, 2, text)).await;

        assert!(matches!(outcome, HandleOutcome::Rejected(RejectReason::Forbidden(_))));
        assert!(outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn test_known_message_triggers_no_sends() {
        let outbound = Arc::new(RecordingOutbound::default());
        let relay = relay(outbound.clone(), false);
        relay.dedup().mark_done(MessageKey::new(SOURCE, 3));

        let outcome = relay.handle(&InboundMessage::text(SOURCE, 3, SCENARIO)).await;

        assert!(matches!(outcome, HandleOutcome::Duplicate));
        assert!(outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn test_edit_after_forward_is_ignored() {
        let outbound = Arc::new(RecordingOutbound::default());
        let relay = relay(outbound.clone(), false);
        let mut msg = InboundMessage::text(SOURCE, 4, SCENARIO);

        relay.handle(&msg).await;
        msg.edited = true;
        let outcome = relay.handle(&msg).await;

        assert!(matches!(outcome, HandleOutcome::Duplicate));
        assert_eq!(outbound.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_everywhere_can_retry() {
        let outbound = Arc::new(RecordingOutbound::failing(&[-2001, -2002]));
        let relay = relay(outbound, false);
        let msg = InboundMessage::text(SOURCE, 5, SCENARIO);

        relay.handle(&msg).await;
        let outcome = relay.handle(&msg).await;

        assert!(matches!(outcome, HandleOutcome::Dispatched(_)));
    }

    #[tokio::test]
    async fn test_unrenderable_qr_goes_out_as_text() {
        let outbound = Arc::new(RecordingOutbound::default());
        let rules = FilterRules::new(r"https://example\.com/\w+", vec!["Answer:".into()], vec![], true).unwrap();
        let dispatch = DispatchSettings {
            send_delay: Duration::ZERO,
            ..DispatchSettings::default()
        };
        let routes = Routes {
            sources: vec![SOURCE],
            destinations: vec![-2001],
            skip_media: true,
        };
        let relay = Relay::new(rules, TransformSettings::default(), dispatch, routes, outbound.clone()).unwrap();
        let text = format!("Answer: 1\nhttps://example.com/{}", "a".repeat(3000));

        let outcome = relay.handle(&InboundMessage::text(SOURCE, 7, text.clone())).await;

        assert!(matches!(outcome, HandleOutcome::Dispatched(ref r) if r.succeeded() == 1));
        assert_eq!(
            outbound.sent(),
            vec![Sent::Text { channel: -2001, text, link_preview: false }]
        );
    }

    #[tokio::test]
    async fn test_media_posts_are_skipped() {
        let outbound = Arc::new(RecordingOutbound::default());
        let relay = relay(outbound.clone(), false);
        let msg = InboundMessage {
            has_media: true,
            ..InboundMessage::text(SOURCE, 6, SCENARIO)
        };

        assert!(matches!(relay.handle(&msg).await, HandleOutcome::SkippedMedia));
        assert!(outbound.sent().is_empty());
        assert!(relay.is_source(SOURCE));
        assert!(!relay.is_source(-5));
    }
}
