//! crates/command/src/error.rs
//!
//! Synthesis and parsing failures.

use model::{DestinationType, ModelError, Tool};
use thiserror::Error;

/// Errors raised while building a command.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The job failed validation.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The tool cannot write to the destination kind.
    #[error("{tool} does not support {destination} destinations")]
    UnsupportedDestination {
        /// Tool of the job.
        tool: Tool,
        /// Requested destination kind.
        destination: DestinationType,
    },

    /// The destination path does not have the shape the destination kind needs.
    #[error("invalid {destination} destination path {path:?}: {reason}")]
    InvalidDestination {
        /// Destination kind.
        destination: DestinationType,
        /// Offending path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The snapshot id cannot exist for this tool.
    #[error("snapshot {id} not found")]
    SnapshotNotFound {
        /// Requested snapshot id.
        id: String,
    },
}

/// Errors raised while parsing tool output.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON output did not match the expected shape.
    #[error("malformed {tool} output: {source}")]
    Json {
        /// Tool that produced the output.
        tool: Tool,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },

    /// Line-oriented output did not match the expected shape.
    #[error("unexpected {tool} output on line {line}")]
    Unexpected {
        /// Tool that produced the output.
        tool: Tool,
        /// One-based line number.
        line: usize,
    },
}
