//! The JSON file describing one job invocation.

use std::fs;
use std::path::{Path, PathBuf};

use model::{BackupJobConfig, Secret, SshEndpoint};
use secrets::{CredentialRequest, MemoryCredentialStore};
use serde::Deserialize;

use crate::error::CliError;
use crate::keystore;

/// Host, credentials, and job read from `--job FILE`.
///
/// Credentials are not attached yet: they go through the secret resolver
/// when the job starts, so stored keys and inline values follow one path.
#[derive(Debug)]
pub struct Invocation {
    /// The job's host.
    pub endpoint: SshEndpoint,
    /// Explicit key reference and inline credentials.
    pub credentials: CredentialRequest,
    /// Key assigned to the host, used when nothing else is given.
    pub system_key_id: Option<String>,
    /// Stored keys available to the resolver.
    pub key_store: MemoryCredentialStore,
    /// The job itself.
    pub job: BackupJobConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInvocation {
    ssh: RawSsh,
    #[serde(default)]
    key_store: Option<String>,
    job: BackupJobConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSsh {
    #[serde(flatten)]
    endpoint: SshEndpoint,
    #[serde(default)]
    ssh_key_id: Option<String>,
    #[serde(default)]
    system_key_id: Option<String>,
    #[serde(default)]
    private_key: Option<Secret>,
    #[serde(default)]
    private_key_path: Option<String>,
    #[serde(default)]
    passphrase: Option<Secret>,
    #[serde(default)]
    password: Option<Secret>,
}

impl Invocation {
    /// Reads and validates an invocation file.
    ///
    /// `ssh.privateKeyPath` and `keyStore` are resolved relative to the file,
    /// so key material never has to be inlined.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|source| CliError::ReadJob {
            path: path.to_path_buf(),
            source,
        })?;
        let RawInvocation { ssh, key_store, job } =
            serde_json::from_str(&text).map_err(|source| CliError::ParseJob {
                path: path.to_path_buf(),
                source,
            })?;

        let mut private_key = ssh.private_key;
        if let Some(key_path) = ssh.private_key_path {
            let key_path = resolve_relative(path, &key_path);
            let key = fs::read_to_string(&key_path).map_err(|source| CliError::ReadKey {
                path: key_path,
                source,
            })?;
            private_key = Some(Secret::new(key));
        }

        let credentials = CredentialRequest {
            ssh_key_id: ssh.ssh_key_id.filter(|id| !id.is_empty()),
            password: ssh.password.filter(|value| !value.is_empty()),
            private_key: private_key.filter(|value| !value.is_empty()),
            passphrase: ssh.passphrase,
        };
        let system_key_id = ssh.system_key_id.filter(|id| !id.is_empty());
        if credentials.ssh_key_id.is_none()
            && system_key_id.is_none()
            && credentials.private_key.is_none()
            && credentials.password.is_none()
        {
            return Err(CliError::MissingCredentials {
                path: path.to_path_buf(),
            });
        }

        let key_store = match key_store {
            Some(store_path) => keystore::load(&resolve_relative(path, &store_path))?,
            None => MemoryCredentialStore::new(),
        };
        Ok(Self {
            endpoint: ssh.endpoint,
            credentials,
            system_key_id,
            key_store,
            job,
        })
    }
}

fn resolve_relative(job_file: &Path, relative: &str) -> PathBuf {
    let relative = Path::new(relative);
    if relative.is_absolute() {
        return relative.to_path_buf();
    }
    job_file
        .parent()
        .map_or_else(|| relative.to_path_buf(), |dir| dir.join(relative))
}
