#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `secrets` turns the credential reference carried by a job invocation into
//! plaintext SSH material. Stored keys are fetched from a [`CredentialStore`]
//! and decrypted by a [`SecretCipher`], trying each [`MasterKey`] of a
//! [`KeyRing`] in order.
//!
//! The encryption scheme itself belongs to the collaborator that implements
//! [`SecretCipher`]; this crate only sequences the attempts.
//!
//! # Invariants
//!
//! - Decrypted material only ever lives in [`model::Secret`] values, which
//!   zeroize on drop and render as `<redacted>` through `Debug`.
//! - Diagnostics name key ids and master-key labels, never key material.
//! - No attempt is retried beyond the keys present in the ring.

mod cipher;
mod error;
mod keyring;
mod resolver;
mod store;

pub use cipher::{CipherError, SecretCipher};
pub use error::SecretError;
pub use keyring::{KeyRing, LEGACY_MASTER_KEY, MasterKey, StaticMasterKey};
pub use resolver::{CredentialRequest, ResolvedCredentials, SecretResolver};
pub use store::{CredentialStore, MemoryCredentialStore, StoreError, StoredSshKey};
