//! crates/cli/src/error.rs
//! Failures that stop the CLI before a job starts.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors; every variant maps to exit code 2.
#[derive(Debug, Error)]
pub enum CliError {
    /// The invocation file could not be read.
    #[error("cannot read job file {path}: {source}")]
    ReadJob {
        /// Path given with `--job`.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The invocation file is not a valid job description.
    #[error("invalid job file {path}: {source}")]
    ParseJob {
        /// Path given with `--job`.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The private key referenced by `privateKeyPath` could not be read.
    #[error("cannot read private key {path}: {source}")]
    ReadKey {
        /// Path from the job file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The `ssh` section names neither a stored key nor inline credentials.
    #[error("{path}: ssh needs sshKeyId, systemKeyId, privateKey, privateKeyPath, or password")]
    MissingCredentials {
        /// Path given with `--job`.
        path: PathBuf,
    },

    /// The key store named by `keyStore` could not be read.
    #[error("cannot read key store {path}: {source}")]
    ReadKeyStore {
        /// Resolved key store path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The key store is not a map of key ids to stored keys.
    #[error("invalid key store {path}: {source}")]
    ParseKeyStore {
        /// Resolved key store path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The async runtime could not be started.
    #[error("cannot start runtime: {0}")]
    Runtime(#[source] io::Error),
}
