//! HTTP surface of the broker: webhook ingress and websocket subscriptions.

pub mod ingress;
pub mod ws;

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{any, get};
use tokio::task::JoinHandle;
use tracing::info;

use hookrelay_core::BodyPolicy;

use crate::config::BrokerConfig;
use crate::hub::{Hub, HubHandle};

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub body_policy: BodyPolicy,
}

/// Build the axum router.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", any(|| async { StatusCode::NOT_FOUND }))
        .route("/ws/{service}", get(ws::subscribe))
        .route("/{service}", any(ingress::ingress))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Handle to a running broker.
pub struct BrokerHandle {
    local_addr: SocketAddr,
    hub: HubHandle,
    server: JoinHandle<io::Result<()>>,
}

impl BrokerHandle {
    /// Address the server actually bound to (useful with port 0).
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub const fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Wait for the server to finish after its shutdown future resolved.
    pub async fn join(self) -> io::Result<()> {
        self.server.await.map_err(io::Error::other)?
    }
}

/// Bind, start the hub and serve until `shutdown` resolves.
pub async fn start<F>(config: &BrokerConfig, shutdown: F) -> io::Result<BrokerHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (hub, _hub_task) = Hub::spawn(&config.hub);
    let state = AppState {
        hub: hub.clone(),
        body_policy: config.body_policy,
    };
    let router = build_router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        body_policy = %config.body_policy,
        "Broker listening"
    );

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    });

    Ok(BrokerHandle {
        local_addr,
        hub,
        server,
    })
}
