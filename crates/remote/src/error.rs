//! crates/remote/src/error.rs
//! Failures of sessions and command channels.
//!
//! Messages name the target and the failing step only; credential material
//! never reaches an error value.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while connecting or running commands.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// TCP connect or key exchange failed.
    #[error("connection to {target} failed: {reason}")]
    ConnectionFailed {
        /// `user@host:port` of the target.
        target: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The connect limit expired.
    #[error("connection to {target} timed out after {elapsed:?}")]
    ConnectTimedOut {
        /// `user@host:port` of the target.
        target: String,
        /// The limit that expired.
        elapsed: Duration,
    },

    /// The server rejected the offered credentials.
    #[error("{method} authentication rejected by {target}")]
    AuthenticationRejected {
        /// `user@host:port` of the target.
        target: String,
        /// `publickey` or `password`.
        method: &'static str,
    },

    /// The private key could not be decoded or re-encoded.
    #[error("private key unusable: {reason}")]
    InvalidKey {
        /// Decoder message; key material is never included.
        reason: String,
    },

    /// A command was started on a session that is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// Opening or driving the command channel failed.
    #[error("command channel failed: {reason}")]
    Channel {
        /// Transport-level reason.
        reason: String,
    },

    /// A local process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Staging the identity file for a local transport failed.
    #[error("failed to stage identity file: {0}")]
    Identity(#[source] io::Error),
}

impl RemoteError {
    pub(crate) fn channel(reason: impl ToString) -> Self {
        Self::Channel {
            reason: reason.to_string(),
        }
    }
}
