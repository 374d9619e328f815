//! Logging setup shared by the broker and forwarding binaries.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set and valid; otherwise `default_filter` applies
/// (see [`default_filter`]). With `log_json` every event is one JSON line.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let output: Box<dyn Layer<Registry> + Send + Sync> = if log_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
}

/// Filter directive enabling `level` for a binary crate and the shared core,
/// e.g. `default_filter("hookrelay_broker", "debug")`.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},hookrelay_core={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_core() {
        assert_eq!(
            default_filter("hookrelay_forward", "info"),
            "hookrelay_forward=info,hookrelay_core=info"
        );
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(default_filter("hookrelay_broker", "debug")).is_ok());
    }
}
