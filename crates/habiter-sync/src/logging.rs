#![forbid(unsafe_code)]

//! JSON structured logging for binaries embedding habiter.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding application's choice. [`init_json`] is the stock setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "HABITER_LOG";

/// Install a global JSON subscriber.
///
/// The filter comes from [`LOG_ENV`] when set and valid, else from
/// `default_filter` (for example `"info"` or `"habiter_sync=debug"`).
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_json(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}
