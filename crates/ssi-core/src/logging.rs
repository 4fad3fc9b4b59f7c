//! tracing-subscriber setup shared by every host embedding the agent.

use crate::config::LoggingConfig;

/// Install the global subscriber: `RUST_LOG` wins over the configured level,
/// `format = "json"` selects structured output, anything else is plain text.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}
