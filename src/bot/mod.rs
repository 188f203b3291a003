//! Bot module - Telegram transport around the relay pipeline.

pub mod dispatcher;
pub mod health;
pub mod outbound;
mod runtime;
mod webhook;

pub use dispatcher::{AppState, build_dispatcher};
pub use health::Health;
pub use outbound::TelegramOutbound;
pub use runtime::run;
