//! Process-lifetime record of forwarded posts.
//!
//! Never persisted: a restart starts from an empty set, so a post seen again
//! after a restart may be forwarded twice.

use std::sync::Arc;

use dashmap::DashSet;

use super::message::MessageKey;

/// When a post is recorded as forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Record on the first successful destination send. A post that failed
    /// everywhere stays eligible, so an edit can retry it.
    #[default]
    FirstSuccess,
    /// Record once every destination was attempted, whatever the outcome.
    AfterAttempt,
}

/// Forwarded and in-flight message keys (lock-free, cheap to clone).
#[derive(Clone, Default)]
pub struct DedupSet {
    done: Arc<DashSet<MessageKey>>,
    in_flight: Arc<DashSet<MessageKey>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.done.contains(key)
    }

    /// Claim `key` for processing.
    ///
    /// Returns `None` if it was already forwarded or another handler holds it.
    /// The claim is released when the guard drops, including on panic.
    pub fn claim(&self, key: MessageKey) -> Option<Claim<'_>> {
        if !self.in_flight.insert(key) {
            return None;
        }
        let claim = Claim { set: self, key };
        // Holders mark done before releasing, so this sees any finished run.
        if self.done.contains(&key) {
            return None;
        }
        Some(claim)
    }

    pub fn mark_done(&self, key: MessageKey) {
        self.done.insert(key);
    }

    /// Number of forwarded posts.
    pub fn len(&self) -> usize {
        self.done.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

/// In-flight claim on a message key.
pub struct Claim<'a> {
    set: &'a DedupSet,
    key: MessageKey,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set.in_flight.remove(&self.key);
    }
}
