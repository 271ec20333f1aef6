//! Logging setup for the facade.
//!
//! This is how `LogSettings::level` from the config layer takes effect:
//! a global `tracing` subscriber capped at the configured level.

use std::str::FromStr;

use tracing::Level;

/// Installs the global subscriber, filtering at `level` ("error" through
/// "trace"). Unrecognized names fall back to `info`.
///
/// Only the first call installs anything; later calls (common in tests,
/// where every test may want logging up) are no-ops.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level(level))
        .with_target(false)
        .try_init();
}

fn max_level(name: &str) -> Level {
    Level::from_str(name).unwrap_or(Level::INFO)
}
