//! hookrelay Forwarding Client
//!
//! Subscribes to one broker channel and replays every event against a
//! local HTTP service.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use hookrelay_core::BodyPolicy;
use hookrelay_forward::config::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_REQUEST_TIMEOUT};
use hookrelay_forward::{ForwardClient, ForwardConfig};

#[derive(Parser, Debug)]
#[command(name = "hookrelay-forward")]
#[command(version, about = "hookrelay forwarding client - replay broker events locally")]
struct Args {
    /// Broker host and port
    #[arg(short, long, default_value = "localhost:3000", env = "HOOKRELAY_BROKER")]
    address: String,

    /// Connect to the broker over TLS (wss://)
    #[arg(long, env = "HOOKRELAY_SSL")]
    ssl: bool,

    /// Channel to subscribe to
    #[arg(short, long, default_value = "test", env = "HOOKRELAY_SERVICE")]
    service: String,

    /// Base URL events are replayed against
    #[arg(short, long, default_value = "http://localhost:8000", env = "HOOKRELAY_FORWARD")]
    forward: String,

    /// Persist bodies of error responses
    #[arg(short, long, env = "HOOKRELAY_LOG_RESPONSES")]
    log: bool,

    /// Directory for persisted responses
    #[arg(long, default_value = ".", env = "HOOKRELAY_LOG_DIR")]
    log_dir: PathBuf,

    /// Which methods get the payload as body: non-get, post-only or always
    #[arg(long, default_value = "non-get", env = "HOOKRELAY_BODY_POLICY")]
    body_policy: BodyPolicy,

    /// Maximum replays in flight at once
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT, env = "HOOKRELAY_MAX_IN_FLIGHT")]
    max_in_flight: usize,

    /// Milliseconds to wait for the broker to acknowledge close on interrupt
    #[arg(long, default_value_t = 1000, env = "HOOKRELAY_CLOSE_TIMEOUT_MS")]
    close_timeout_ms: u64,

    /// Seconds before a replayed request is abandoned
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(), env = "HOOKRELAY_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "HOOKRELAY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "HOOKRELAY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    hookrelay_core::tracing_init::init_tracing(
        &hookrelay_core::tracing_init::default_filter("hookrelay_forward", &args.log_level),
        args.log_json,
    )?;

    // tokio-tungstenite and reqwest both use rustls without a bundled provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = %args.address,
        service = %args.service,
        "Starting hookrelay-forward"
    );

    let mut config = ForwardConfig::new(&args.address, &args.service, &args.forward)?
        .with_tls(args.ssl)
        .with_body_policy(args.body_policy)
        .with_max_in_flight(args.max_in_flight)
        .with_close_timeout(Duration::from_millis(args.close_timeout_ms))
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs));
    if args.log {
        config = config.with_response_log(&args.log_dir);
    }

    let client = ForwardClient::new(config)?;
    client.run(interrupt()).await?;

    info!("Forwarding client stopped");
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
