//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; hosts that do not install their
//! own subscriber can call [`init`] with the configured default directive.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a registry with an env filter and a fmt layer
///
/// `RUST_LOG` wins over `default_filter`. Returns false when a global
/// subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
