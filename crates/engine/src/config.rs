//! Engine-wide settings.
//!
//! Each value resolves in priority order: explicit builder value, then the
//! matching `BACKHAUL_*` environment variable, then the built-in default.

use remote::{TimeoutConfig, TimeoutSetting};
use tracing::warn;

/// Environment variable overriding the connect limit, in seconds.
pub const CONNECT_TIMEOUT_ENV: &str = "BACKHAUL_CONNECT_TIMEOUT";
/// Environment variable overriding the per-command limit, in seconds.
pub const COMMAND_TIMEOUT_ENV: &str = "BACKHAUL_COMMAND_TIMEOUT";
/// Environment variable overriding the keepalive interval, in seconds.
pub const KEEPALIVE_ENV: &str = "BACKHAUL_KEEPALIVE";
/// Environment variable overriding the live log queue capacity.
pub const LOG_QUEUE_ENV: &str = "BACKHAUL_LOG_QUEUE";

/// Default capacity of the bounded queue between a job and its log consumer.
pub const DEFAULT_LOG_QUEUE: usize = 256;

const LOG_QUEUE_BOUNDS: (usize, usize) = (1, 65_536);

/// Resolved engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    timeouts: TimeoutConfig,
    log_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            log_queue: DEFAULT_LOG_QUEUE,
        }
    }
}

impl EngineConfig {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::builder().build()
    }

    /// Connection and command limits.
    #[must_use]
    pub const fn timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    /// Capacity of the live log queue.
    #[must_use]
    pub const fn log_queue(&self) -> usize {
        self.log_queue
    }
}

/// Builder for [`EngineConfig`].
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineConfigBuilder {
    connect: Option<u64>,
    command: Option<u64>,
    keepalive: Option<u64>,
    log_queue: Option<usize>,
}

impl EngineConfigBuilder {
    /// Connect limit in seconds; `0` disables it.
    #[must_use]
    pub const fn connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.connect = Some(seconds);
        self
    }

    /// Per-command limit in seconds; `0` disables it.
    #[must_use]
    pub const fn command_timeout_secs(mut self, seconds: u64) -> Self {
        self.command = Some(seconds);
        self
    }

    /// Keepalive interval in seconds; `0` disables keepalives.
    #[must_use]
    pub const fn keepalive_secs(mut self, seconds: u64) -> Self {
        self.keepalive = Some(seconds);
        self
    }

    /// Live log queue capacity, clamped to `[1, 65536]`.
    #[must_use]
    pub const fn log_queue(mut self, capacity: usize) -> Self {
        self.log_queue = Some(capacity);
        self
    }

    /// Resolves against the process environment.
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.build_with(|name| std::env::var(name).ok())
    }

    /// Resolves against `lookup` instead of the process environment.
    #[must_use]
    pub fn build_with(self, lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
        let seconds = |explicit: Option<u64>, name: &str| {
            explicit
                .or_else(|| parse_env(&lookup, name))
                .map_or(TimeoutSetting::Default, TimeoutSetting::from_seconds)
        };
        let timeouts = TimeoutConfig {
            connect: seconds(self.connect, CONNECT_TIMEOUT_ENV),
            command: seconds(self.command, COMMAND_TIMEOUT_ENV),
            keepalive: seconds(self.keepalive, KEEPALIVE_ENV),
        };
        let log_queue = self
            .log_queue
            .or_else(|| parse_env(&lookup, LOG_QUEUE_ENV))
            .unwrap_or(DEFAULT_LOG_QUEUE)
            .clamp(LOG_QUEUE_BOUNDS.0, LOG_QUEUE_BOUNDS.1);
        EngineConfig {
            timeouts,
            log_queue,
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: "backhaul::engine", variable = name, value = %raw, "ignoring unparsable override");
            None
        }
    }
}
