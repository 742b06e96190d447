//! The encrypt/decrypt boundary supplied by the credential owner.

use model::Secret;
use thiserror::Error;

use crate::keyring::MasterKey;

/// A cipher failure. The reason must not include plaintext or key material.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct CipherError {
    reason: String,
}

impl CipherError {
    /// Creates an error with a non-sensitive description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Opaque symmetric encryption keyed by a [`MasterKey`].
pub trait SecretCipher: Send + Sync {
    /// Encrypts `plaintext` into a storable payload.
    fn encrypt(&self, plaintext: &str, key: &MasterKey) -> Result<String, CipherError>;

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt) under the same key.
    fn decrypt(&self, payload: &str, key: &MasterKey) -> Result<Secret, CipherError>;
}
