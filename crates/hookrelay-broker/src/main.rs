//! hookrelay Broker
//!
//! Accepts webhook calls on `/{service}` and fans them out to every
//! websocket subscribed on `/ws/{service}`.

use std::net::SocketAddr;

use clap::Parser;
use tracing::info;

use hookrelay_broker::BrokerConfig;
use hookrelay_core::BodyPolicy;

#[derive(Parser, Debug)]
#[command(name = "hookrelay-broker")]
#[command(version, about = "hookrelay broker - webhook ingress and websocket fan-out")]
struct Args {
    /// Host and port to listen on
    #[arg(long, default_value = "127.0.0.1:3000", env = "HOOKRELAY_ADDR")]
    addr: SocketAddr,

    /// Which methods have their body relayed: non-get, post-only or always
    #[arg(long, default_value = "non-get", env = "HOOKRELAY_BODY_POLICY")]
    body_policy: BodyPolicy,

    /// Largest accepted webhook body in bytes
    #[arg(long, default_value_t = hookrelay_broker::config::DEFAULT_MAX_BODY_BYTES, env = "HOOKRELAY_MAX_BODY_BYTES")]
    max_body_bytes: usize,

    /// Events queued per subscriber before it is disconnected as too slow
    #[arg(long, default_value_t = 256, env = "HOOKRELAY_OUTBOX_CAPACITY")]
    outbox_capacity: usize,

    /// Capacity of the hub command queue
    #[arg(long, default_value_t = 1024, env = "HOOKRELAY_COMMAND_CAPACITY")]
    command_capacity: usize,

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
        &hookrelay_core::tracing_init::default_filter("hookrelay_broker", &args.log_level),
        args.log_json,
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting hookrelay-broker"
    );

    let config = BrokerConfig::new(args.addr)
        .with_body_policy(args.body_policy)
        .with_max_body_bytes(args.max_body_bytes)
        .with_outbox_capacity(args.outbox_capacity)
        .with_command_capacity(args.command_capacity);

    let handle = hookrelay_broker::start(&config, shutdown_signal()).await?;

    // Notify systemd that the broker is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(false, &[sd_notify::NotifyState::Ready])?;

    info!(addr = %handle.local_addr(), "Broker ready");
    handle.join().await?;

    info!("Broker stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}
