//! `tracing` subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LogConfig;

/// Install the global subscriber.  `RUST_LOG` takes precedence over
/// `config.level`.  Calling this twice is harmless; the second call is ignored.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        Registry::default().with(filter).with(fmt::layer().json()).try_init()
    } else {
        Registry::default().with(filter).with(fmt::layer()).try_init()
    };

    if result.is_ok() {
        tracing::debug!(level = %config.level, json = config.json, "logging initialised");
    }
}
