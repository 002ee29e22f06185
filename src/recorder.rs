//! Channel-keyed history of synthetic messages
//!
//! Every message the proxy fabricates on a channel is appended here so that a
//! later subscribe to the same channel can be answered with the full history.
//! Histories are never pruned and live as long as the process.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// A message that belongs to a named channel
pub trait Recorded: Clone + Send + Sync {
    fn channel(&self) -> &str;
}

#[derive(Debug)]
pub struct MessageReplay<M> {
    messages: RwLock<HashMap<String, Vec<M>>>,
}

impl<M> Default for MessageReplay<M> {
    fn default() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
        }
    }
}

impl<M: Recorded> MessageReplay<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the history of the message's channel
    pub fn add_message(&self, msg: M) {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        let history = messages.entry(msg.channel().to_string()).or_default();
        history.push(msg);
        debug!("Recorded message #{} on replay channel", history.len());
    }

    /// Everything recorded so far on `channel`, oldest first
    pub fn replay(&self, channel: &str) -> Vec<M> {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        messages.get(channel).cloned().unwrap_or_default()
    }

    pub fn len(&self, channel: &str) -> usize {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        messages.get(channel).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, channel: &str) -> bool {
        self.len(channel) == 0
    }
}
