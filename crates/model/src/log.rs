use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Category of an [`ExecutionLog`] entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Neutral progress narration.
    Info,
    /// A step finished successfully.
    Success,
    /// Failure reported by the engine or the tool.
    Error,
    /// Transfer progress (percentages, rates).
    Progress,
    /// Summary statistics emitted by the tool.
    Stats,
    /// SSH session lifecycle.
    Ssh,
    /// A command being dispatched.
    Cmd,
}

impl LogKind {
    /// Returns the wire identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
            Self::Progress => "progress",
            Self::Stats => "stats",
            Self::Ssh => "ssh",
            Self::Cmd => "cmd",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One line of the user-facing job transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// Entry category.
    #[serde(rename = "type")]
    pub kind: LogKind,
    /// Redacted message text.
    pub message: String,
    /// Emission instant.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ExecutionLog {
    /// Creates an entry stamped with the current UTC time.
    pub fn now(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kind_as_type_field() {
        let log = ExecutionLog::now(LogKind::Progress, "42%");
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["message"], "42%");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
