//! Subscriber connections and their write guard.
//!
//! A [`Subscriber`] wraps the write half of one duplex connection. All writes
//! and the close sequence go through a single mutex holding the connection's
//! [`ConnectionState`], so a connection is never written concurrently and is
//! never written again once it started closing.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::HubCommand;

/// Unique identity of one subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a subscriber connection's write side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Writable.
    Open,
    /// A close sequence is in progress; no further writes.
    Closing,
    /// The underlying connection is closed.
    Closed,
}

/// Error from writing to a subscriber connection.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Write half of a subscriber connection.
#[async_trait]
pub trait EventSink: Send + 'static {
    /// Write one serialized event as a single text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), SinkError>;

    /// Best-effort close handshake followed by closing the connection.
    async fn close(&mut self);
}

/// Outcome of one delivery attempt.
#[derive(Debug)]
pub enum Delivery {
    Sent,
    /// The connection was no longer open; nothing was written.
    Skipped,
    /// The write failed and the connection has been closed.
    Failed(SinkError),
}

struct Guarded {
    state: ConnectionState,
    sink: Box<dyn EventSink>,
}

/// A connection registered under one channel.
pub struct Subscriber {
    id: ConnectionId,
    channel: String,
    guard: Mutex<Guarded>,
}

impl Subscriber {
    pub fn new(channel: impl Into<String>, sink: impl EventSink) -> Self {
        Self {
            id: ConnectionId::new(),
            channel: channel.into(),
            guard: Mutex::new(Guarded {
                state: ConnectionState::Open,
                sink: Box::new(sink),
            }),
        }
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn state(&self) -> ConnectionState {
        self.guard.lock().await.state
    }

    /// Write one serialized event under the guard.
    ///
    /// On write failure the connection moves through `Closing` to `Closed`
    /// while still holding the guard, so no other write can slip in between.
    pub async fn deliver(&self, text: &str) -> Delivery {
        let mut guard = self.guard.lock().await;
        if guard.state != ConnectionState::Open {
            return Delivery::Skipped;
        }
        match guard.sink.send_text(text).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                guard.state = ConnectionState::Closing;
                guard.sink.close().await;
                guard.state = ConnectionState::Closed;
                Delivery::Failed(e)
            }
        }
    }

    /// Close the connection if it is still open.
    ///
    /// Returns `true` if this call performed the close.
    pub async fn close(&self) -> bool {
        let mut guard = self.guard.lock().await;
        if guard.state != ConnectionState::Open {
            return false;
        }
        guard.state = ConnectionState::Closing;
        guard.sink.close().await;
        guard.state = ConnectionState::Closed;
        true
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Drain one subscriber's outbox in order until the outbox is dropped or the
/// connection fails. A failed write asks the hub to unregister the subscriber.
pub(super) async fn delivery_loop(
    subscriber: Arc<Subscriber>,
    mut outbox: mpsc::Receiver<Arc<str>>,
    hub: mpsc::WeakSender<HubCommand>,
) {
    while let Some(text) = outbox.recv().await {
        match subscriber.deliver(&text).await {
            Delivery::Sent => {}
            Delivery::Skipped => {
                debug!(connection_id = %subscriber.id(), "Subscriber no longer open, stopping delivery");
                break;
            }
            Delivery::Failed(e) => {
                warn!(
                    connection_id = %subscriber.id(),
                    channel = %subscriber.channel(),
                    error = %e,
                    "Write to subscriber failed, closing connection"
                );
                if let Some(tx) = hub.upgrade() {
                    let _ = tx.send(HubCommand::Unregister(subscriber.id())).await;
                }
                break;
            }
        }
    }
}
