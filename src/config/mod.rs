//! Configuration module for the relay bot.
//!
//! Loads configuration from environment variables (optionally via `.env`).
//! Everything is read once at startup and immutable afterwards.

use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::relay::qr::{BOX_SIZE_RANGE, MARGIN_RANGE, QrStyle, parse_hex_color};
use crate::relay::transform::DEFAULT_ANSWER_LABELS;
use crate::relay::{
    DedupPolicy, DispatchSettings, FilterRules, ForwardStyle, Routes, TransformSettings,
};

/// Link every forwarded post must carry.
pub const DEFAULT_LINK_PATTERN: &str = r"https://app\.binance\.com/uni-qr/cart/\d+";

/// At least one of these must appear in a post.
pub const DEFAULT_VALID_MARKERS: &[&str] = &[
    "Answer:", "𝗔𝗻𝘀𝘄𝗲𝗿:", "USDT", "BTC", "ETH", "BNB", "DOGE", "TON", "SOL", "TRX",
];

pub const DEFAULT_FORBIDDEN_WORDS: &[&str] = &["box"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("invalid LINK_PATTERN: {0}")]
    Pattern(#[from] regex::Error),

    #[error("WEBHOOK_URL must be set when BOT_MODE is webhook")]
    WebhookUrlMissing,
}

/// Bot running mode
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Webhook listener settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: Url,
    pub port: u16,
    pub secret: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook: Option<WebhookConfig>,

    /// Port of the standalone health server in polling mode; 0 disables it.
    pub health_port: u16,

    // Pipeline
    pub routes: Routes,
    pub rules: FilterRules,
    pub transform: TransformSettings,
    pub dispatch: DispatchSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let bot_mode = match vars.get("BOT_MODE").map(|m| m.to_lowercase()).as_deref() {
            Some("webhook") => BotMode::Webhook,
            _ => BotMode::Polling,
        };

        let webhook = match vars.get("WEBHOOK_URL") {
            Some(raw) => Some(WebhookConfig {
                url: Url::parse(&raw).map_err(|_| ConfigError::Invalid {
                    key: "WEBHOOK_URL",
                    value: raw.clone(),
                })?,
                port: vars.parse("WEBHOOK_PORT", 8443)?,
                secret: vars.get("WEBHOOK_SECRET"),
            }),
            None => None,
        };

        // Validate webhook URL is set if mode is webhook
        if bot_mode == BotMode::Webhook && webhook.is_none() {
            return Err(ConfigError::WebhookUrlMissing);
        }

        let routes = Routes {
            sources: vars.id_list("SOURCE_CHAT_IDS")?,
            destinations: vars.id_list("DESTINATION_CHAT_IDS")?,
            skip_media: vars.flag("SKIP_MEDIA", true)?,
        };

        let rules = FilterRules::new(
            &vars
                .get("LINK_PATTERN")
                .unwrap_or_else(|| DEFAULT_LINK_PATTERN.to_string()),
            vars.list("VALID_MARKERS", DEFAULT_VALID_MARKERS),
            vars.list("FORBIDDEN_WORDS", DEFAULT_FORBIDDEN_WORDS),
            vars.flag("STRIP_LINK_BEFORE_CHECK", true)?,
        )?;

        let qr = if vars.flag("QR_ENABLED", true)? {
            let defaults = QrStyle::default();
            Some(QrStyle {
                foreground: vars.color("QR_FOREGROUND", defaults.foreground)?,
                background: vars.color("QR_BACKGROUND", defaults.background)?,
                box_size: vars.bounded("QR_BOX_SIZE", defaults.box_size, BOX_SIZE_RANGE)?,
                margin: vars.bounded("QR_MARGIN", defaults.margin, MARGIN_RANGE)?,
                overlay: vars.get("QR_OVERLAY").unwrap_or(defaults.overlay),
            })
        } else {
            None
        };

        let style = match vars.get("FORWARD_STYLE").map(|s| s.to_lowercase()).as_deref() {
            None | Some("cleaned") => ForwardStyle::Cleaned,
            Some("card") => ForwardStyle::Card,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "FORWARD_STYLE",
                    value: other.to_string(),
                });
            }
        };

        let transform = TransformSettings {
            preserve_original_formatting: vars.flag("PRESERVE_FORMATTING", false)?,
            answer_labels: DEFAULT_ANSWER_LABELS.iter().map(|s| s.to_string()).collect(),
            answer_placeholder: vars
                .get("ANSWER_PLACEHOLDER")
                .unwrap_or_else(|| "N/A".to_string()),
            style,
            card_hashtags: vars
                .get("CARD_HASHTAGS")
                .unwrap_or_else(|| "#square #slot".to_string()),
            qr,
        };

        let policy = match vars.get("DEDUP_POLICY").map(|s| s.to_lowercase()).as_deref() {
            None | Some("first_success") => DedupPolicy::FirstSuccess,
            Some("after_attempt") => DedupPolicy::AfterAttempt,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "DEDUP_POLICY",
                    value: other.to_string(),
                });
            }
        };

        let dispatch = DispatchSettings {
            link_preview: vars.flag("LINK_PREVIEW", false)?,
            send_delay: Duration::from_millis(vars.parse("SEND_DELAY_MS", 1000)?),
            policy,
        };

        Ok(Self {
            bot_token: vars.get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?,
            bot_mode,
            webhook,
            health_port: vars.parse("HEALTH_PORT", 8080)?,
            routes,
            rules,
            transform,
            dispatch,
        })
    }
}

/// Typed access to the raw variables. Blank values count as unset.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
            None => Ok(default),
        }
    }

    fn bounded<T>(&self, key: &'static str, default: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + ToString,
    {
        let value = self.parse(key, default)?;
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
            })
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(ConfigError::Invalid {
                key,
                value: other.to_string(),
            }),
        }
    }

    /// Comma-separated strings, falling back to `default` when unset.
    fn list(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Comma-separated chat ids; at least one is required.
    fn id_list(&self, key: &'static str) -> Result<Vec<i64>, ConfigError> {
        let raw = self.get(key).ok_or(ConfigError::Missing(key))?;
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>().map_err(|_| ConfigError::Invalid {
                    key,
                    value: s.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if ids.is_empty() {
            return Err(ConfigError::Missing(key));
        }
        Ok(ids)
    }

    fn color(&self, key: &'static str, default: [u8; 3]) -> Result<[u8; 3], ConfigError> {
        match self.get(key) {
            Some(raw) => parse_hex_color(&raw).ok_or(ConfigError::Invalid { key, value: raw }),
            None => Ok(default),
        }
    }
}
