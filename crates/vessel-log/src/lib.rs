//! Process-wide diagnostics setup.
//!
//! The core logs through `tracing`; this crate wires a single subscriber at
//! startup so every component's spans and events land in one place. Verbosity
//! is controlled by `RUST_LOG`, defaulting to `info` when unset.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Must be called once, before any
/// other component starts, so that configuration errors are themselves
/// logged.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
