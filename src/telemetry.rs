//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! The crate itself only emits `tracing` events; the embedding application
//! decides when (and whether) to install a subscriber. LOG_LEVEL controls
//! the filter (e.g. "debug" or directives like "info,clove_challenges=debug").

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
  let filter = EnvFilter::try_from_env("LOG_LEVEL")
    .unwrap_or_else(|_| EnvFilter::new("info,clove_challenges=debug"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .init();
}
