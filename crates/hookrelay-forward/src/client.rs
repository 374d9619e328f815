//! Websocket subscription to a broker channel.
//!
//! Lifecycle: `Connecting -> Connected -> Receiving -> Closing -> Closed`.
//! The session ends when the broker closes the stream, the stream fails,
//! or the caller's shutdown future resolves. On shutdown a normal close
//! frame is sent and the broker's acknowledgement awaited for at most
//! `close_timeout`. There is no reconnect.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use crate::config::ForwardConfig;
use crate::error::ForwardError;
use crate::replay::Replayer;

/// Reason sent in the close frame when the user interrupts the client.
pub const INTERRUPT_REASON: &str = "Client interruption.";

/// Phase of a forwarding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Connected,
    Receiving,
    Closing,
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Receiving => "receiving",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Forwards one broker channel to the local target.
pub struct ForwardClient {
    config: ForwardConfig,
    replayer: Arc<Replayer>,
    state: watch::Sender<ClientState>,
}

impl ForwardClient {
    pub fn new(config: ForwardConfig) -> Result<Self, ForwardError> {
        let replayer = Arc::new(Replayer::new(&config)?);
        let (state, _) = watch::channel(ClientState::Connecting);
        Ok(Self {
            config,
            replayer,
            state,
        })
    }

    pub fn replayer(&self) -> &Arc<Replayer> {
        &self.replayer
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ClientState) {
        let prev = self.state.send_replace(next);
        debug!(from = %prev, to = %next, "Client state changed");
    }

    /// Connect and forward events until the stream ends or `shutdown` resolves.
    ///
    /// A failed connect is returned as an error. A stream error after
    /// connecting ends the session with [`ForwardError::Stream`].
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ForwardError>
    where
        F: Future<Output = ()>,
    {
        self.transition(ClientState::Connecting);
        let url = self.config.subscription_url()?;
        info!(url = %url, forward_to = %self.config.forward_to, "Connecting to broker");

        let (ws, _response) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                self.transition(ClientState::Closed);
                return Err(ForwardError::Connection(e.to_string()));
            }
        };
        self.transition(ClientState::Connected);
        info!(service = %self.config.service, "Subscribed to channel");

        let (mut write, read) = ws.split();
        let mut reader = tokio::spawn(read_loop(read, Arc::clone(&self.replayer)));
        self.transition(ClientState::Receiving);

        tokio::pin!(shutdown);
        let result = tokio::select! {
            joined = &mut reader => {
                self.transition(ClientState::Closing);
                match joined {
                    Ok(result) => result,
                    Err(e) => Err(ForwardError::Stream(e.to_string())),
                }
            }
            () = &mut shutdown => {
                self.transition(ClientState::Closing);
                info!("Interrupted, closing connection");
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: INTERRUPT_REASON.into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    warn!(error = %e, "Failed to send close frame");
                    reader.abort();
                } else if tokio::time::timeout(self.config.close_timeout, &mut reader)
                    .await
                    .is_err()
                {
                    warn!(timeout = ?self.config.close_timeout, "Broker did not acknowledge close");
                    reader.abort();
                }
                Ok(())
            }
        };

        self.transition(ClientState::Closed);
        let stats = self.replayer.stats().snapshot();
        info!(
            received = stats.received,
            forwarded = stats.forwarded,
            malformed = stats.malformed,
            error_responses = stats.error_responses,
            failed = stats.failed,
            "Connection closed"
        );
        result
    }
}

/// Read frames until the broker closes or the stream fails, dispatching
/// every data frame to the replayer.
pub async fn read_loop<S>(mut stream: S, replayer: Arc<Replayer>) -> Result<(), ForwardError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                replayer.dispatch(text.as_str().as_bytes());
            }
            Ok(Message::Binary(bytes)) => {
                replayer.dispatch(&bytes);
            }
            Ok(Message::Close(frame)) => {
                info!(reason = ?frame, "Broker closed the connection");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Connection lost");
                return Err(ForwardError::Stream(e.to_string()));
            }
        }
    }
    Ok(())
}
