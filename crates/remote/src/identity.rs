//! Private keys staged on disk for the local `ssh` transport of pull mode.

use std::io::Write;
use std::path::Path;

use model::{Secret, SshAuth};
use russh::keys::decode_secret_key;
use russh::keys::ssh_key::LineEnding;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::error::RemoteError;

/// A private key written to an owner-only temporary file.
///
/// The file is removed when the value is dropped. Passphrase-protected keys
/// are decrypted first: the `ssh` client reading the file runs in batch mode
/// and cannot prompt.
#[derive(Debug)]
pub struct IdentityFile {
    file: NamedTempFile,
}

impl IdentityFile {
    /// Stages the key of `auth`; password sessions need no file.
    pub fn for_auth(auth: &SshAuth) -> Result<Option<Self>, RemoteError> {
        match auth {
            SshAuth::PrivateKey { key, passphrase } => {
                Self::stage(key, passphrase.as_ref()).map(Some)
            }
            SshAuth::Password(_) => Ok(None),
        }
    }

    /// Writes `key` to a fresh temporary file.
    pub fn stage(key: &Secret, passphrase: Option<&Secret>) -> Result<Self, RemoteError> {
        let material = match passphrase.filter(|passphrase| !passphrase.is_empty()) {
            Some(passphrase) => {
                let decoded = decode_secret_key(key.expose(), Some(passphrase.expose()))
                    .map_err(|err| RemoteError::InvalidKey {
                        reason: err.to_string(),
                    })?;
                decoded
                    .to_openssh(LineEnding::LF)
                    .map_err(|err| RemoteError::InvalidKey {
                        reason: err.to_string(),
                    })?
            }
            None => Zeroizing::new(key.expose().trim().to_owned()),
        };

        let mut file = tempfile::Builder::new()
            .prefix("backhaul-id-")
            .tempfile()
            .map_err(RemoteError::Identity)?;
        restrict_to_owner(file.path())?;
        file.write_all(material.trim_end().as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush())
            .map_err(RemoteError::Identity)?;
        Ok(Self { file })
    }

    /// Location of the staged key.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<(), RemoteError> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, Permissions::from_mode(0o600)).map_err(RemoteError::Identity)
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<(), RemoteError> {
    Ok(())
}
