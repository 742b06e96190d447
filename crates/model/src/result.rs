use serde::Serialize;
use time::OffsetDateTime;

use crate::log::ExecutionLog;

/// Error text recorded when the SSH session could not be opened.
pub const CONNECTION_FAILED_MESSAGE: &str = "Failed to connect to SSH server";

/// Captured outcome of one executed command.
///
/// Built once when the command finishes; never updated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Everything the command wrote to stdout.
    pub stdout: String,
    /// Everything the command wrote to stderr.
    pub stderr: String,
    /// Exit status; `None` when the command was interrupted before reporting one.
    pub exit_code: Option<u32>,
}

impl CommandResult {
    /// Reports whether the command exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Reports whether the command ended without an exit status.
    #[must_use]
    pub const fn interrupted(&self) -> bool {
        self.exit_code.is_none()
    }

    /// Returns the trimmed stderr, falling back to stdout when stderr is empty.
    #[must_use]
    pub fn failure_output(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Record of one backup or restore invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    /// Whether the primary operation succeeded.
    pub success: bool,
    /// When the invocation started.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// When the invocation finished.
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    /// Bytes processed, when the tool reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_processed: Option<u64>,
    /// Files processed, when the tool reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_processed: Option<u64>,
    /// Fatal errors, in order of occurrence.
    pub errors: Vec<String>,
    /// Non-fatal problems such as a failed prune.
    pub warnings: Vec<String>,
    /// Full transcript in emission order.
    pub logs: Vec<ExecutionLog>,
}

impl BackupResult {
    /// Starts an in-progress result stamped with the current time.
    #[must_use]
    pub fn started() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            success: false,
            start_time: now,
            end_time: now,
            bytes_processed: None,
            files_processed: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Result of an invocation whose SSH connection could not be established.
    #[must_use]
    pub fn connection_failed(start_time: OffsetDateTime, logs: Vec<ExecutionLog>) -> Self {
        Self {
            success: false,
            start_time,
            end_time: OffsetDateTime::now_utc(),
            bytes_processed: None,
            files_processed: None,
            errors: vec![CONNECTION_FAILED_MESSAGE.to_owned()],
            warnings: Vec::new(),
            logs,
        }
    }

    /// Stamps the end time and attaches the transcript.
    pub fn finish(&mut self, logs: Vec<ExecutionLog>) {
        self.end_time = OffsetDateTime::now_utc();
        self.logs = logs;
    }
}
