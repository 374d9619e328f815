//! `hookrelay` Core Library
//!
//! Shared functionality for the broker and the forwarding client:
//! - Webhook event model and its JSON wire codec
//! - Body policy deciding which methods carry a payload
//! - Common error types
//! - Tracing initialization

pub mod error;
pub mod event;
pub mod policy;
pub mod tracing_init;

pub use error::{Error, Result};
pub use event::WebhookEvent;
pub use policy::BodyPolicy;
