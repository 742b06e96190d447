//! crates/secrets/src/error.rs
//!
//! Failures raised while resolving SSH credentials.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::store::StoreError;

/// Errors produced by [`SecretResolver`](crate::SecretResolver).
///
/// Messages carry key ids and field names only.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The referenced key id is not present in the credential store.
    #[error("SSH key {id} not found in credential store")]
    CredentialNotFound {
        /// Requested key id.
        id: String,
    },

    /// Every master key in the ring failed to decrypt a stored field.
    #[error("failed to decrypt {field} of SSH key {id} with {attempts} master key(s)")]
    DecryptionFailed {
        /// Key id whose field could not be decrypted.
        id: String,
        /// Stored field name.
        field: &'static str,
        /// Number of master keys tried.
        attempts: usize,
    },

    /// The primary master key could not encrypt a new payload.
    #[error("failed to encrypt with master key {master}: {source}")]
    EncryptionFailed {
        /// Label of the primary key.
        master: String,
        /// Cipher failure.
        #[source]
        source: CipherError,
    },

    /// The request resolved to neither a private key nor a password.
    #[error("no SSH credential supplied")]
    NoCredentials,

    /// The credential store itself failed.
    #[error("credential store lookup for SSH key {id} failed: {source}")]
    Store {
        /// Requested key id.
        id: String,
        /// Store-specific failure.
        #[source]
        source: StoreError,
    },
}
