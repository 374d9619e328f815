//! Broadcast hub.
//!
//! A single coordinator task owns the [`registry`](self::registry) and is the
//! only place it is mutated. Everything else talks to it through a cloneable
//! [`HubHandle`] that enqueues [`HubCommand`]s:
//!
//! - `Register` adds a subscriber and starts its delivery task.
//! - `Broadcast` serializes the event once and queues the same text on every
//!   subscriber of the channel without waiting for any write.
//! - `Unregister` removes a connection from every channel.
//!
//! Each subscriber has exactly one delivery task draining a FIFO outbox, so
//! events reach one subscriber in the order the hub processed them, while
//! distinct subscribers are written in parallel. A subscriber whose outbox
//! is full is disconnected rather than skipped, so a registered subscriber
//! never has a gap in what it received.

mod registry;
mod subscriber;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hookrelay_core::WebhookEvent;

use registry::{ChannelRegistry, Member};
pub use subscriber::{ConnectionId, ConnectionState, Delivery, EventSink, SinkError, Subscriber};

/// Default capacity of the hub command queue.
const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Default capacity of each subscriber's delivery queue.
const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Hub sizing.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the command queue shared by all producers.
    pub command_capacity: usize,
    /// Events queued per subscriber; a subscriber that falls further behind
    /// is disconnected.
    pub outbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

/// Snapshot of hub counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub channels: usize,
    pub subscribers: usize,
    pub broadcasts: u64,
    /// Broadcasts to a channel without subscribers.
    pub unrouted: u64,
    /// Subscribers disconnected because their outbox was full.
    pub evicted: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Hub is not running")]
    Stopped,
}

pub(crate) enum HubCommand {
    Register {
        channel: String,
        subscriber: Arc<Subscriber>,
    },
    Broadcast {
        channel: String,
        event: WebhookEvent,
    },
    Unregister(ConnectionId),
    Subscribers {
        channel: String,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
    Stats(oneshot::Sender<HubStats>),
}

/// Producer side of the hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a connection's write half under `channel`.
    pub async fn register(
        &self,
        channel: &str,
        sink: impl EventSink,
    ) -> Result<Arc<Subscriber>, HubError> {
        let subscriber = Arc::new(Subscriber::new(channel, sink));
        self.send(HubCommand::Register {
            channel: channel.to_string(),
            subscriber: Arc::clone(&subscriber),
        })
        .await?;
        Ok(subscriber)
    }

    /// Queue an event for every subscriber of `channel`.
    pub async fn broadcast(&self, channel: &str, event: WebhookEvent) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast {
            channel: channel.to_string(),
            event,
        })
        .await
    }

    /// Remove a connection from every channel.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister(id)).await
    }

    /// Connections currently subscribed to `channel`, sorted.
    pub async fn subscribers(&self, channel: &str) -> Result<Vec<ConnectionId>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Subscribers {
            channel: channel.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats(reply)).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.tx.send(command).await.map_err(|_| HubError::Stopped)
    }
}

/// The coordinator. Runs until every [`HubHandle`] is dropped.
pub struct Hub {
    registry: ChannelRegistry,
    commands: mpsc::Receiver<HubCommand>,
    /// Handed to delivery tasks so a failed write can request `Unregister`
    /// without keeping the hub alive.
    weak_tx: mpsc::WeakSender<HubCommand>,
    outbox_capacity: usize,
    stats: HubStats,
}

impl Hub {
    pub fn new(config: &HubConfig) -> (Self, HubHandle) {
        let (tx, commands) = mpsc::channel(config.command_capacity.max(1));
        let hub = Self {
            registry: ChannelRegistry::new(),
            commands,
            weak_tx: tx.downgrade(),
            outbox_capacity: config.outbox_capacity.max(1),
            stats: HubStats::default(),
        };
        (hub, HubHandle { tx })
    }

    /// Create a hub and run it on the current runtime.
    pub fn spawn(config: &HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config);
        (handle, tokio::spawn(hub.run()))
    }

    pub async fn run(mut self) {
        info!(outbox_capacity = self.outbox_capacity, "Hub started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        info!("Hub stopped");
    }

    /// Apply one command. Never waits on a subscriber.
    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                channel,
                subscriber,
            } => self.register(&channel, subscriber),
            HubCommand::Broadcast { channel, event } => self.broadcast(&channel, &event),
            HubCommand::Unregister(id) => {
                let removed = self.registry.unregister(id);
                if removed > 0 {
                    info!(connection_id = %id, "Subscriber unregistered");
                } else {
                    debug!(connection_id = %id, "Unregister for unknown connection");
                }
            }
            HubCommand::Subscribers { channel, reply } => {
                let _ = reply.send(self.registry.connection_ids(&channel));
            }
            HubCommand::Stats(reply) => {
                let _ = reply.send(HubStats {
                    channels: self.registry.channel_count(),
                    subscribers: self.registry.subscriber_count(),
                    ..self.stats.clone()
                });
            }
        }
    }

    fn register(&mut self, channel: &str, subscriber: Arc<Subscriber>) {
        let (outbox, rx) = mpsc::channel(self.outbox_capacity);
        tokio::spawn(subscriber::delivery_loop(
            Arc::clone(&subscriber),
            rx,
            self.weak_tx.clone(),
        ));
        info!(channel, connection_id = %subscriber.id(), "Subscriber registered");
        self.registry.register(channel, Member { subscriber, outbox });
    }

    fn broadcast(&mut self, channel: &str, event: &WebhookEvent) {
        self.stats.broadcasts += 1;
        if channel.is_empty() {
            warn!(method = %event.method, "Dropping broadcast without channel");
            self.stats.unrouted += 1;
            return;
        }
        let Some(members) = self.registry.members(channel) else {
            debug!(channel, method = %event.method, "No subscribers, dropping event");
            self.stats.unrouted += 1;
            return;
        };

        let text: Arc<str> = match event.encode() {
            Ok(text) => text.into(),
            Err(e) => {
                error!(channel, error = %e, "Failed to serialize broadcast event");
                return;
            }
        };

        let subscribers = members.len();
        let mut lagging = Vec::new();
        for member in members.values() {
            match member.outbox.try_send(Arc::clone(&text)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    lagging.push(Arc::clone(&member.subscriber));
                }
                // Delivery task already exited after a failed write; its
                // Unregister is on the way.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        for subscriber in lagging {
            self.evict(subscriber);
        }
        debug!(
            channel,
            method = %event.method,
            subscribers,
            "Event broadcast"
        );
    }

    /// Drop a subscriber that cannot keep up. It is treated like one whose
    /// write failed: removed from every channel, then closed.
    fn evict(&mut self, subscriber: Arc<Subscriber>) {
        warn!(
            channel = subscriber.channel(),
            connection_id = %subscriber.id(),
            outbox_capacity = self.outbox_capacity,
            "Subscriber outbox full, disconnecting it"
        );
        self.registry.unregister(subscriber.id());
        self.stats.evicted += 1;
        tokio::spawn(async move {
            subscriber.close().await;
        });
    }
}
