//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and `warn` to everything else.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

fn filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,rust_conform={}", settings.level))
    })
}

/// Install the global subscriber. Returns false if one was already installed.
pub fn init(settings: &LoggingSettings) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(settings))
        .with_target(false);
    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
