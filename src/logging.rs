//! Logging setup
//!
//! `SPECTRUM_LOG` takes an `EnvFilter` directive, e.g.
//! `SPECTRUM_LOG=spectrum_control=debug`.

use tracing_subscriber::EnvFilter;

/// Environment variable read for the filter
pub const LOG_ENV: &str = "SPECTRUM_LOG";

fn default_directive() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Install the global fmt subscriber. Calling it again is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
