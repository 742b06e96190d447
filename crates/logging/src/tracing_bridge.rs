//! crates/logging/src/tracing_bridge.rs
//! Installation of the process-wide tracing subscriber.
//!
//! The CLI maps its `-v` count onto a default set of directives for the
//! `backhaul::*` targets. When [`LOG_ENV_VAR`] is set, its directives replace
//! the default entirely.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding `EnvFilter` directives.
pub const LOG_ENV_VAR: &str = "BACKHAUL_LOG";

/// Returns the filter directives for a verbosity level.
///
/// Level 0 only reports warnings; each `-v` lowers the threshold for the
/// `backhaul` targets by one step. Third-party crates (russh in particular)
/// stay at `warn` regardless.
#[must_use]
pub fn default_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,backhaul={level}")
}

/// Installs a stderr formatting subscriber filtered by verbosity or [`LOG_ENV_VAR`].
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = tracing_subscriber::registry().with(filter).with(fmt).try_init();
}
