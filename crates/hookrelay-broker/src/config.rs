//! Broker configuration.

use std::net::SocketAddr;

use hookrelay_core::BodyPolicy;

use crate::hub::HubConfig;

/// Default request body limit for ingress calls (10 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for one broker instance.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address the HTTP server binds to.
    pub addr: SocketAddr,
    /// Which inbound methods have their body captured into the event.
    pub body_policy: BodyPolicy,
    /// Largest accepted ingress body.
    pub max_body_bytes: usize,
    /// Hub sizing.
    pub hub: HubConfig,
}

impl BrokerConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            body_policy: BodyPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            hub: HubConfig::default(),
        }
    }

    #[must_use]
    pub const fn with_body_policy(mut self, policy: BodyPolicy) -> Self {
        self.body_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    #[must_use]
    pub const fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.hub.outbox_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.hub.command_capacity = capacity;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3000)))
    }
}
