//! Forwarding client configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use hookrelay_core::BodyPolicy;

use crate::error::ForwardError;

/// Default cap on concurrently running replays.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default wait for the broker to acknowledge our close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for one replayed request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for one forwarding client.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Broker `host:port`.
    pub broker_addr: String,

    /// Connect with `wss://` instead of `ws://`.
    pub tls: bool,

    /// Channel to subscribe to.
    pub service: String,

    /// Base URL every event is replayed against. Its query is replaced by
    /// the event's query.
    pub forward_to: Url,

    /// Persist error response bodies to `response_dir`.
    pub log_responses: bool,

    /// Directory for persisted error responses.
    pub response_dir: PathBuf,

    /// Which methods get the event payload as request body.
    pub body_policy: BodyPolicy,

    /// Maximum replays in flight at once.
    pub max_in_flight: usize,

    /// How long to wait for the broker's close acknowledgement on interrupt.
    pub close_timeout: Duration,

    /// Timeout for one replayed request.
    pub request_timeout: Duration,
}

impl ForwardConfig {
    /// Create a config with required fields and defaults.
    ///
    /// Fails when `forward_to` is not an absolute `http`/`https` URL or the
    /// service name is empty.
    pub fn new(
        broker_addr: impl Into<String>,
        service: impl Into<String>,
        forward_to: &str,
    ) -> Result<Self, ForwardError> {
        let forward_to = Url::parse(forward_to)?;
        if !matches!(forward_to.scheme(), "http" | "https") {
            return Err(ForwardError::Config(format!(
                "forward URL must be http or https, got '{}'",
                forward_to.scheme()
            )));
        }
        let service = service.into();
        if service.trim().is_empty() {
            return Err(ForwardError::Config("service name is empty".into()));
        }
        Ok(Self {
            broker_addr: broker_addr.into(),
            tls: false,
            service,
            forward_to,
            log_responses: false,
            response_dir: PathBuf::from("."),
            body_policy: BodyPolicy::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Enable persisting error responses into `dir`.
    #[must_use]
    pub fn with_response_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_responses = true;
        self.response_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_body_policy(mut self, policy: BodyPolicy) -> Self {
        self.body_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Websocket URL of the channel subscription, `ws[s]://<broker>/ws/<service>`.
    pub fn subscription_url(&self) -> Result<Url, ForwardError> {
        let scheme = if self.tls { "wss" } else { "ws" };
        let mut url = Url::parse(&format!("{scheme}://{}/", self.broker_addr))?;
        url.path_segments_mut()
            .map_err(|()| ForwardError::Config(format!("invalid broker address '{}'", self.broker_addr)))?
            .clear()
            .push("ws")
            .push(&self.service);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = ForwardConfig::new("localhost:3000", "test", "http://localhost:8000").unwrap();
        assert!(!config.tls);
        assert!(!config.log_responses);
        assert_eq!(config.body_policy, BodyPolicy::NonGet);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.close_timeout, Duration::from_secs(1));
        assert_eq!(config.forward_to.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn subscription_url_plain_and_tls() {
        let config = ForwardConfig::new("localhost:3000", "orders", "http://localhost:8000").unwrap();
        assert_eq!(
            config.subscription_url().unwrap().as_str(),
            "ws://localhost:3000/ws/orders"
        );
        let config = config.with_tls(true);
        assert_eq!(
            config.subscription_url().unwrap().as_str(),
            "wss://localhost:3000/ws/orders"
        );
    }

    #[test]
    fn subscription_url_escapes_service() {
        let config =
            ForwardConfig::new("relay.example.com", "my service", "http://localhost:8000").unwrap();
        assert_eq!(
            config.subscription_url().unwrap().as_str(),
            "ws://relay.example.com/ws/my%20service"
        );
    }

    #[test]
    fn malformed_forward_url_is_rejected() {
        assert!(matches!(
            ForwardConfig::new("localhost:3000", "test", "not a url"),
            Err(ForwardError::Url(_))
        ));
        assert!(matches!(
            ForwardConfig::new("localhost:3000", "test", "ftp://localhost"),
            Err(ForwardError::Config(_))
        ));
    }

    #[test]
    fn empty_service_is_rejected() {
        assert!(matches!(
            ForwardConfig::new("localhost:3000", " ", "http://localhost:8000"),
            Err(ForwardError::Config(_))
        ));
    }

    #[test]
    fn response_log_builder_enables_logging() {
        let config = ForwardConfig::new("localhost:3000", "test", "http://localhost:8000")
            .unwrap()
            .with_response_log("/tmp/responses");
        assert!(config.log_responses);
        assert_eq!(config.response_dir, PathBuf::from("/tmp/responses"));
    }
}
