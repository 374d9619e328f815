//! hookrelay Forwarding Client Library
//!
//! Subscribes to one broker channel over a websocket and replays every
//! received event as an HTTP request against a local target:
//! - Connection lifecycle with graceful close on interrupt
//! - Request reconstruction from the wire event
//! - Bounded concurrent replay
//! - Optional persistence of error responses

pub mod client;
pub mod config;
pub mod error;
pub mod replay;
pub mod response_log;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{ClientState, ForwardClient};
pub use config::ForwardConfig;
pub use error::ForwardError;
pub use replay::{ReplayError, ReplayOutcome, ReplayStats, ReplayStatsSnapshot, Replayer};
