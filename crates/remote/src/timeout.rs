//! Connection and command time limits.

use std::num::NonZeroU64;
use std::time::Duration;

/// Default limit for establishing and authenticating a session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit for one command. Backups of large trees take hours.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between SSH keepalive probes.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// One configurable time limit.
///
/// The variant records whether the caller picked a value, disabled the limit,
/// or left the default for the operation in place.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TimeoutSetting {
    /// Use the default of the operation.
    #[default]
    Default,
    /// No limit.
    Disabled,
    /// A caller-provided limit in seconds.
    Seconds(NonZeroU64),
}

impl TimeoutSetting {
    /// Interprets a raw seconds value; `0` disables the limit.
    #[must_use]
    pub const fn from_seconds(seconds: u64) -> Self {
        match NonZeroU64::new(seconds) {
            Some(value) => Self::Seconds(value),
            None => Self::Disabled,
        }
    }

    /// Resolves the setting against the operation's default.
    #[must_use]
    pub const fn effective(self, default: Duration) -> Option<Duration> {
        match self {
            Self::Default => Some(default),
            Self::Disabled => None,
            Self::Seconds(seconds) => Some(Duration::from_secs(seconds.get())),
        }
    }
}

/// Time limits applied by sessions and the executor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimeoutConfig {
    /// Limit for TCP connect, key exchange, and authentication together.
    pub connect: TimeoutSetting,
    /// Limit for a single command, from dispatch to exit status.
    pub command: TimeoutSetting,
    /// Interval between keepalive probes on an idle session.
    pub keepalive: TimeoutSetting,
}

impl TimeoutConfig {
    /// Effective connect limit.
    #[must_use]
    pub const fn connect_timeout(&self) -> Option<Duration> {
        self.connect.effective(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Effective per-command limit.
    #[must_use]
    pub const fn command_timeout(&self) -> Option<Duration> {
        self.command.effective(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Effective keepalive interval.
    #[must_use]
    pub const fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive.effective(DEFAULT_KEEPALIVE_INTERVAL)
    }
}
