//! Replays received webhook events as HTTP requests against the local target.
//!
//! Each event becomes one request:
//! - method copied verbatim
//! - target URL with its query replaced by the event's query map
//! - body only when the [`BodyPolicy`] allows it for the method
//! - event headers set on top of the client's, later values overwrite
//!
//! Replays run concurrently, bounded by a semaphore. A failed replay is
//! logged and never affects the next one.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Request};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use hookrelay_core::{BodyPolicy, WebhookEvent};

use crate::config::ForwardConfig;
use crate::error::ForwardError;
use crate::response_log::ResponseLog;

/// Headers owned by the connection to the target, never copied from the event.
const SKIPPED_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// Errors from replaying a single event.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result of a replay that reached the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub status: u16,
    /// Where the response body was persisted, for error statuses with logging on.
    pub logged_to: Option<PathBuf>,
}

/// Counters over the lifetime of a forwarding session.
#[derive(Debug, Default)]
pub struct ReplayStats {
    received: AtomicU64,
    malformed: AtomicU64,
    forwarded: AtomicU64,
    error_responses: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ReplayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStatsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub forwarded: u64,
    pub error_responses: u64,
    pub failed: u64,
}

impl ReplayStats {
    pub fn snapshot(&self) -> ReplayStatsSnapshot {
        ReplayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Turns wire events into outbound requests and sends them.
#[derive(Debug)]
pub struct Replayer {
    http: reqwest::Client,
    target: Url,
    body_policy: BodyPolicy,
    limit: Arc<Semaphore>,
    response_log: Option<ResponseLog>,
    stats: ReplayStats,
}

impl Replayer {
    pub fn new(config: &ForwardConfig) -> Result<Self, ForwardError> {
        if config.max_in_flight == 0 {
            return Err(ForwardError::Config("max_in_flight must be at least 1".into()));
        }

        // reqwest is built with rustls-no-provider; an Err only means the
        // provider was installed already.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let response_log = config
            .log_responses
            .then(|| ResponseLog::new(&config.response_dir, &config.service));

        Ok(Self {
            http,
            target: config.forward_to.clone(),
            body_policy: config.body_policy,
            limit: Arc::new(Semaphore::new(config.max_in_flight)),
            response_log,
            stats: ReplayStats::default(),
        })
    }

    pub const fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// Target URL for `event`: the configured URL with its query replaced.
    pub fn target_url(&self, event: &WebhookEvent) -> Url {
        let mut url = self.target.clone();
        if event.query.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(event.query_pairs());
        }
        url
    }

    /// Reconstruct the outbound request for `event`.
    pub fn build_request(&self, event: &WebhookEvent) -> Result<Request, ReplayError> {
        let method = Method::from_bytes(event.method.as_bytes())
            .map_err(|_| ReplayError::InvalidMethod(event.method.clone()))?;

        let mut builder = self.http.request(method, self.target_url(event));
        if self.body_policy.carries_body(&event.method) && event.has_payload() {
            builder = builder.body(event.payload.clone().unwrap_or_default());
        }
        let mut request = builder.build()?;

        let headers = request.headers_mut();
        for (name, value) in &event.headers {
            if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            let parsed = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping header that is not valid HTTP"),
            }
        }
        Ok(request)
    }

    /// Send `event` to the target and handle the response.
    pub async fn replay(&self, event: &WebhookEvent) -> Result<ReplayOutcome, ReplayError> {
        let request = self.build_request(event)?;
        debug!(method = %event.method, url = %request.url(), "Replaying event");

        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_client_error() && !status.is_server_error() {
            return Ok(ReplayOutcome {
                status: status.as_u16(),
                logged_to: None,
            });
        }

        warn!(method = %event.method, status = status.as_u16(), "Target returned an error status");
        let Some(log) = &self.response_log else {
            return Ok(ReplayOutcome {
                status: status.as_u16(),
                logged_to: None,
            });
        };
        let logged_to = match response.bytes().await {
            Ok(body) => match log.persist(&event.method, &body).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, dir = %log.dir().display(), "Cannot persist response body");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Cannot read response body");
                None
            }
        };
        Ok(ReplayOutcome {
            status: status.as_u16(),
            logged_to,
        })
    }

    /// Decode one wire message and replay it in the background.
    ///
    /// Malformed messages are counted and dropped. The returned handle
    /// completes once the replay has finished.
    pub fn dispatch(self: &Arc<Self>, message: &[u8]) -> Option<JoinHandle<()>> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let event = match WebhookEvent::decode(message) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Dropping malformed event");
                return None;
            }
        };

        let replayer = Arc::clone(self);
        Some(tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&replayer.limit).acquire_owned().await else {
                return;
            };
            replayer.record(&event, replayer.replay(&event).await);
        }))
    }

    fn record(&self, event: &WebhookEvent, result: Result<ReplayOutcome, ReplayError>) {
        match result {
            Ok(outcome) if outcome.status >= 400 => {
                self.stats.error_responses.fetch_add(1, Ordering::Relaxed);
            }
            Ok(outcome) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                info!(method = %event.method, status = outcome.status, "Event forwarded");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(method = %event.method, error = %e, "Replay failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_helpers::spawn_target;

    fn replayer(target: &str) -> Arc<Replayer> {
        let config = ForwardConfig::new("localhost:3000", "orders", target).unwrap();
        Arc::new(Replayer::new(&config).unwrap())
    }

    #[test]
    fn get_with_repeated_query_and_no_body() {
        let replayer = replayer("http://localhost:8000");
        let event = WebhookEvent::new("GET")
            .with_payload(b"ignored".to_vec())
            .with_query_value("a", "1")
            .with_query_value("a", "2");

        let request = replayer.build_request(&event).unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().as_str(), "http://localhost:8000/?a=1&a=2");
        assert!(request.body().is_none());
    }

    #[test]
    fn target_query_is_replaced_not_merged() {
        let replayer = replayer("http://localhost:8000/hook?stale=1");
        let event = WebhookEvent::new("POST").with_query_value("fresh", "2");
        assert_eq!(
            replayer.target_url(&event).as_str(),
            "http://localhost:8000/hook?fresh=2"
        );
        let event = WebhookEvent::new("POST");
        assert_eq!(
            replayer.target_url(&event).as_str(),
            "http://localhost:8000/hook"
        );
    }

    #[test]
    fn post_carries_payload_and_headers() {
        let replayer = replayer("http://localhost:8000");
        let event = WebhookEvent::new("POST")
            .with_payload(b"{x:1}".to_vec())
            .with_header("content-type", "application/json")
            .with_header("x-signature", "abc");

        let request = replayer.build_request(&event).unwrap();

        assert_eq!(request.method(), Method::POST);
        let body = request.body().unwrap().as_bytes().unwrap();
        assert_eq!(body, b"{x:1}");
        assert_eq!(request.headers()["content-type"], "application/json");
        assert_eq!(request.headers()["x-signature"], "abc");
    }

    #[test]
    fn empty_payload_sends_no_body() {
        let replayer = replayer("http://localhost:8000");
        let event = WebhookEvent::new("POST").with_payload(Vec::new());
        let request = replayer.build_request(&event).unwrap();
        assert!(request.body().is_none());
    }

    #[test]
    fn body_policy_always_keeps_get_payload() {
        let config = ForwardConfig::new("localhost:3000", "orders", "http://localhost:8000")
            .unwrap()
            .with_body_policy(BodyPolicy::Always);
        let replayer = Replayer::new(&config).unwrap();
        let event = WebhookEvent::new("GET").with_payload(b"q".to_vec());
        let request = replayer.build_request(&event).unwrap();
        assert_eq!(request.body().unwrap().as_bytes().unwrap(), b"q");
    }

    #[test]
    fn connection_headers_are_not_copied() {
        let replayer = replayer("http://localhost:8000");
        let event = WebhookEvent::new("POST")
            .with_payload(b"abc".to_vec())
            .with_header("host", "relay.example.com")
            .with_header("content-length", "999")
            .with_header("connection", "close")
            .with_header("bad header", "x");

        let request = replayer.build_request(&event).unwrap();

        assert!(request.headers().get("host").is_none());
        assert!(request.headers().get("content-length").is_none());
        assert!(request.headers().get("connection").is_none());
    }

    #[test]
    fn invalid_method_is_rejected() {
        let replayer = replayer("http://localhost:8000");
        let event = WebhookEvent::new("GE T");
        assert!(matches!(
            replayer.build_request(&event),
            Err(ReplayError::InvalidMethod(_))
        ));
    }

    #[test]
    fn zero_in_flight_is_a_config_error() {
        let config = ForwardConfig::new("localhost:3000", "orders", "http://localhost:8000")
            .unwrap()
            .with_max_in_flight(0);
        assert!(matches!(
            Replayer::new(&config),
            Err(ForwardError::Config(_))
        ));
    }

    #[tokio::test]
    async fn dispatch_drops_malformed_and_replays_valid() {
        let mut target = spawn_target(200).await;
        let replayer = replayer(&target.url);

        assert!(replayer.dispatch(b"not json").is_none());
        let event = WebhookEvent::new("POST").with_payload(b"{x:1}".to_vec());
        replayer
            .dispatch(event.encode().unwrap().as_bytes())
            .unwrap()
            .await
            .unwrap();

        let captured = target.next().await;
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.body, b"{x:1}");
        assert!(target.requests.try_recv().is_err());

        let stats = replayer.stats().snapshot();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.forwarded, 1);
    }

    #[tokio::test]
    async fn error_response_is_persisted_when_enabled() {
        let target = spawn_target(500).await;
        let dir = tempfile::tempdir().unwrap();
        let config = ForwardConfig::new("localhost:3000", "orders", &target.url)
            .unwrap()
            .with_response_log(dir.path());
        let replayer = Replayer::new(&config).unwrap();

        let outcome = replayer
            .replay(&WebhookEvent::new("PUT").with_payload(b"x".to_vec()))
            .await
            .unwrap();

        assert_eq!(outcome.status, 500);
        let path = outcome.logged_to.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("PUT-orders-"), "{name}");
        assert_eq!(std::fs::read(&path).unwrap(), b"target says 500");
    }

    #[tokio::test]
    async fn error_response_not_persisted_when_disabled() {
        let target = spawn_target(404).await;
        let replayer = replayer(&target.url);
        let outcome = replayer.replay(&WebhookEvent::new("GET")).await.unwrap();
        assert_eq!(outcome.status, 404);
        assert!(outcome.logged_to.is_none());
    }

    #[tokio::test]
    async fn unreachable_target_counts_as_failed() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ForwardConfig::new("localhost:3000", "orders", &format!("http://{addr}"))
            .unwrap()
            .with_request_timeout(Duration::from_secs(2));
        let replayer = Arc::new(Replayer::new(&config).unwrap());
        let event = WebhookEvent::new("POST");
        replayer
            .dispatch(event.encode().unwrap().as_bytes())
            .unwrap()
            .await
            .unwrap();

        assert_eq!(replayer.stats().snapshot().failed, 1);
    }
}
