//! hookrelay Broker Library
//!
//! Core functionality for the hookrelay broker:
//! - Broadcast hub owning the channel registry
//! - Per-subscriber write guard and ordered delivery
//! - HTTP ingress turning webhook calls into events
//! - Websocket subscription endpoint

pub mod config;
pub mod hub;
pub mod server;

pub use config::BrokerConfig;
pub use hub::{Hub, HubConfig, HubHandle};
pub use server::{AppState, BrokerHandle, build_router, start};
