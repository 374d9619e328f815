//! Channel registry: channel name to the set of subscribed connections.
//!
//! Owned by the hub task and never shared, so it needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::subscriber::{ConnectionId, Subscriber};

/// One registered connection together with its delivery queue.
pub(super) struct Member {
    pub subscriber: Arc<Subscriber>,
    pub outbox: mpsc::Sender<Arc<str>>,
}

/// Channel name to subscribers.
///
/// Channel entries are created on first registration and kept when they
/// become empty.
#[derive(Default)]
pub(super) struct ChannelRegistry {
    channels: HashMap<String, HashMap<ConnectionId, Member>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: &str, member: Member) {
        let id = member.subscriber.id();
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, member);
    }

    /// Remove a connection from every channel. Returns how many entries
    /// were removed.
    pub fn unregister(&mut self, id: ConnectionId) -> usize {
        self.channels
            .values_mut()
            .filter_map(|members| members.remove(&id))
            .count()
    }

    /// Members of a channel, or `None` when the channel has no subscribers.
    pub fn members(&self, channel: &str) -> Option<&HashMap<ConnectionId, Member>> {
        self.channels.get(channel).filter(|members| !members.is_empty())
    }

    pub fn connection_ids(&self, channel: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self
            .channels
            .get(channel)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channels.values().map(HashMap::len).sum()
    }
}
