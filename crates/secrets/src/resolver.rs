//! Credential resolution for one job invocation.

use std::fmt;

use logging::{Redactor, trace_secrets};
use model::{Secret, SshConnectionConfig, SshEndpoint};

use crate::cipher::SecretCipher;
use crate::error::SecretError;
use crate::keyring::{KeyRing, MasterKey};
use crate::store::{CredentialStore, StoredSshKey};

/// Credentials as supplied by the caller of an invocation.
#[derive(Clone, Debug, Default)]
pub struct CredentialRequest {
    /// Explicit stored-key reference.
    pub ssh_key_id: Option<String>,
    /// Plaintext password.
    pub password: Option<Secret>,
    /// Plaintext private key.
    pub private_key: Option<Secret>,
    /// Plaintext passphrase of `private_key`.
    pub passphrase: Option<Secret>,
}

impl CredentialRequest {
    fn has_inline_credentials(&self) -> bool {
        non_empty(self.private_key.as_ref()) || non_empty(self.password.as_ref())
    }
}

/// Plaintext SSH credentials ready for a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    /// Private key, if key authentication applies.
    pub private_key: Option<Secret>,
    /// Passphrase of the private key.
    pub passphrase: Option<Secret>,
    /// Password, if password authentication applies.
    pub password: Option<Secret>,
}

impl ResolvedCredentials {
    /// Iterates every secret value present.
    pub fn secrets(&self) -> impl Iterator<Item = &Secret> {
        self.private_key
            .iter()
            .chain(&self.passphrase)
            .chain(&self.password)
    }

    /// Registers every secret with `redactor`.
    pub fn register_with(&self, redactor: &mut Redactor) {
        redactor.register_all(self.secrets());
    }

    /// Builds a session configuration, preferring the private key over the password.
    pub fn into_ssh_config(
        self,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
    ) -> Result<SshConnectionConfig, SecretError> {
        match (self.private_key, self.password) {
            (Some(key), _) if !key.is_empty() => Ok(SshConnectionConfig::with_private_key(
                host,
                port,
                username,
                key,
                self.passphrase.filter(|passphrase| !passphrase.is_empty()),
            )),
            (_, Some(password)) if !password.is_empty() => {
                Ok(SshConnectionConfig::with_password(host, port, username, password))
            }
            _ => Err(SecretError::NoCredentials),
        }
    }

    /// Attaches the credentials to `endpoint`.
    pub fn connect_to(self, endpoint: &SshEndpoint) -> Result<SshConnectionConfig, SecretError> {
        self.into_ssh_config(endpoint.host.clone(), endpoint.port, endpoint.username.clone())
    }
}

/// Resolves [`CredentialRequest`]s against a store and cipher.
pub struct SecretResolver<S, C> {
    store: S,
    cipher: C,
    keys: KeyRing,
}

impl<S, C> SecretResolver<S, C>
where
    S: CredentialStore,
    C: SecretCipher,
{
    /// Creates a resolver trying `keys` in order.
    pub const fn new(store: S, cipher: C, keys: KeyRing) -> Self {
        Self {
            store,
            cipher,
            keys,
        }
    }

    /// The key ring used for decryption.
    pub const fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Resolves the SSH credentials for one invocation.
    ///
    /// An explicit `ssh_key_id` wins. Without it, and without inline
    /// credentials, the system's assigned key is used. Otherwise the inline
    /// plaintext values are returned unchanged.
    pub async fn resolve(
        &self,
        request: &CredentialRequest,
        system_key_id: Option<&str>,
    ) -> Result<ResolvedCredentials, SecretError> {
        let key_id = request.ssh_key_id.as_deref().or_else(|| {
            if request.has_inline_credentials() {
                None
            } else {
                system_key_id
            }
        });

        if let Some(id) = key_id.filter(|id| !id.is_empty()) {
            return self.resolve_stored(id).await;
        }

        trace_secrets!("using inline credentials");
        Ok(ResolvedCredentials {
            private_key: request.private_key.clone(),
            passphrase: request.passphrase.clone(),
            password: request.password.clone(),
        })
    }

    /// Encrypts `plaintext` under the ring's primary key.
    pub fn seal(&self, plaintext: &str) -> Result<String, SecretError> {
        let key = self.keys.primary();
        self.cipher
            .encrypt(plaintext, key)
            .map_err(|source| SecretError::EncryptionFailed {
                master: key.label().to_owned(),
                source,
            })
    }

    async fn resolve_stored(&self, id: &str) -> Result<ResolvedCredentials, SecretError> {
        let stored = self
            .store
            .ssh_key(id)
            .await
            .map_err(|source| SecretError::Store {
                id: id.to_owned(),
                source,
            })?
            .ok_or_else(|| SecretError::CredentialNotFound { id: id.to_owned() })?;

        let StoredSshKey {
            private_key_data,
            passphrase,
            is_encrypted,
        } = stored;

        if !is_encrypted {
            trace_secrets!(key_id = id, "stored key is not encrypted");
            return Ok(ResolvedCredentials {
                private_key: Some(private_key_data),
                passphrase: passphrase.filter(|value| !value.is_empty()),
                password: None,
            });
        }

        let private_key = self.decrypt_field(id, "private_key_data", &private_key_data)?;
        let passphrase = passphrase
            .filter(|value| !value.is_empty())
            .map(|payload| self.decrypt_field(id, "passphrase", &payload))
            .transpose()?;

        Ok(ResolvedCredentials {
            private_key: Some(private_key),
            passphrase,
            password: None,
        })
    }

    fn decrypt_field(
        &self,
        id: &str,
        field: &'static str,
        payload: &Secret,
    ) -> Result<Secret, SecretError> {
        for key in self.keys.iter() {
            match self.cipher.decrypt(payload.expose(), key) {
                Ok(plaintext) => {
                    trace_secrets!(
                        key_id = id,
                        field,
                        master = key.label(),
                        version = key.version(),
                        "decrypted"
                    );
                    return Ok(plaintext);
                }
                Err(error) => {
                    trace_secrets!(
                        key_id = id,
                        field,
                        master = key.label(),
                        %error,
                        "decryption attempt failed"
                    );
                }
            }
        }
        Err(SecretError::DecryptionFailed {
            id: id.to_owned(),
            field,
            attempts: self.keys.len(),
        })
    }
}

impl<S, C> fmt::Debug for SecretResolver<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.keys.iter().map(MasterKey::label).collect();
        f.debug_struct("SecretResolver")
            .field("keys", &labels)
            .finish_non_exhaustive()
    }
}

fn non_empty(secret: Option<&Secret>) -> bool {
    secret.is_some_and(|secret| !secret.is_empty())
}
