//! crates/model/src/error.rs
//!
//! Validation and conversion errors for the shared data model.

use thiserror::Error;

/// Errors raised while validating or converting job data.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A required field was absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// borg and restic jobs must carry a repository password.
    #[error("{tool} jobs require a repository password")]
    MissingRepoPassword {
        /// Tool name of the offending job.
        tool: &'static str,
    },

    /// A job must back up at least one source path.
    #[error("job has no source paths")]
    EmptySources,

    /// The tool identifier is not one of borg, restic, or rsync.
    #[error("unknown backup tool: {0}")]
    UnknownTool(String),

    /// The destination type is not one of the supported kinds.
    #[error("unknown destination type: {0}")]
    UnknownDestination(String),

    /// A JSON column of a persisted job record could not be encoded or decoded.
    #[error("invalid JSON in job record field {field}: {source}")]
    RecordField {
        /// Column name.
        field: &'static str,
        /// Underlying serde_json failure.
        #[source]
        source: serde_json::Error,
    },
}
