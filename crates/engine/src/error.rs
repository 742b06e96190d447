//! crates/engine/src/error.rs
//! Failures surfaced by operations and runners.
//!
//! Backup and restore never return these: their failures are recorded in
//! the [`BackupResult`](model::BackupResult). Listing operations do.

use command::{ParseError, SynthesisError};
use secrets::SecretError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by listing operations and runners.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The SSH session could not be established.
    #[error("failed to connect to {target}")]
    ConnectionFailed {
        /// `user@host:port` of the target.
        target: String,
    },

    /// Stored SSH credentials could not be resolved.
    #[error("credential resolution failed: {0}")]
    Credentials(#[from] SecretError),

    /// The job cannot be turned into a command.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// A command exited non-zero.
    #[error("{operation} exited with status {status}: {output}")]
    CommandExecutionFailed {
        /// Operation name.
        operation: &'static str,
        /// Exit status.
        status: u32,
        /// Redacted stderr, or stdout when stderr was empty.
        output: String,
    },

    /// The snapshot listing command failed.
    #[error("listing snapshots failed: {output}")]
    ListFailed {
        /// Redacted command output.
        output: String,
    },

    /// The tool does not know the requested snapshot.
    #[error("snapshot {id} not found")]
    SnapshotNotFound {
        /// Requested snapshot id.
        id: String,
    },

    /// A command produced output the adapter could not read.
    #[error("unreadable {operation} output")]
    Parse {
        /// Operation name.
        operation: &'static str,
        /// Parser failure.
        #[source]
        source: ParseError,
    },

    /// The command was cancelled or ran past its time limit.
    #[error("{operation} interrupted: {reason}")]
    Interrupted {
        /// Operation name.
        operation: &'static str,
        /// Cancellation or timeout description.
        reason: String,
    },
}
