//! Tracing subscriber setup for hosts that do not install their own.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting `json` or `text` output.
pub const LOG_FORMAT_ENV: &str = "LOOM_LOG_FORMAT";

/// Install a global subscriber.
///
/// `RUST_LOG` wins over `config.filter`, and `LOOM_LOG_FORMAT` over
/// `config.format`. Returns `false` if a global subscriber was already set.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let format = match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => LogFormat::Json,
        Ok("text") => LogFormat::Text,
        _ => config.format,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };
    installed.is_ok()
}
