//! Event handler system.
//!
//! Channel posts and their edits both go through the relay; the dedup set
//! keeps an edit from re-forwarding a post that already went out.

pub mod forward;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

/// Build the channel post handler.
pub fn channel_post_handler() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_channel_post()
                .filter(forward::is_source)
                .endpoint(forward::on_channel_post),
        )
        .branch(
            Update::filter_edited_channel_post()
                .filter(forward::is_source)
                .endpoint(forward::on_edited_channel_post),
        )
}
