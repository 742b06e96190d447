use std::fmt;

use serde::Deserialize;

use crate::error::ModelError;
use crate::secret::Secret;

const DEFAULT_SSH_PORT: u16 = 22;

/// Authentication material for one SSH session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SshAuth {
    /// OpenSSH/PEM private key, optionally protected by a passphrase.
    PrivateKey {
        /// Key material in text form.
        key: Secret,
        /// Passphrase unlocking `key`.
        passphrase: Option<Secret>,
    },
    /// Plain password authentication.
    Password(Secret),
}

impl SshAuth {
    /// Returns the method name used in diagnostics.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::PrivateKey { .. } => "publickey",
            Self::Password(_) => "password",
        }
    }

    /// Iterates over every secret carried by this value.
    pub fn secrets(&self) -> impl Iterator<Item = &Secret> {
        let (first, second) = match self {
            Self::PrivateKey { key, passphrase } => (Some(key), passphrase.as_ref()),
            Self::Password(password) => (Some(password), None),
        };
        first.into_iter().chain(second)
    }
}

/// Connection parameters of the host a job operates on.
///
/// Immutable once a session has been opened with it. The `Debug`
/// representation never includes credential material.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSshConnection")]
pub struct SshConnectionConfig {
    host: String,
    port: u16,
    username: String,
    auth: SshAuth,
}

impl SshConnectionConfig {
    /// Creates a configuration authenticating with a private key.
    pub fn with_private_key(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        key: Secret,
        passphrase: Option<Secret>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth: SshAuth::PrivateKey { key, passphrase },
        }
    }

    /// Creates a configuration authenticating with a password.
    pub fn with_password(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: Secret,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth: SshAuth::Password(password),
        }
    }

    /// Returns the remote host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the remote SSH port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the authentication material.
    #[must_use]
    pub const fn auth(&self) -> &SshAuth {
        &self.auth
    }

    /// Returns a log-safe `user@host:port` description of the target.
    #[must_use]
    pub fn display_target(&self) -> DisplayTarget<'_> {
        DisplayTarget(self)
    }
}

/// Where a session goes, before credentials are attached.
///
/// Invocations that reference stored keys carry an endpoint; the resolved
/// credentials turn it into an [`SshConnectionConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshEndpoint {
    /// Remote host name or address.
    pub host: String,
    /// Remote SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name.
    pub username: String,
}

impl SshEndpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
        }
    }
}

/// Log-safe rendering of an [`SshConnectionConfig`].
pub struct DisplayTarget<'a>(&'a SshConnectionConfig);

impl fmt::Display for DisplayTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        if config.host.contains(':') && !config.host.starts_with('[') {
            write!(f, "{}@[{}]:{}", config.username, config.host, config.port)
        } else {
            write!(f, "{}@{}:{}", config.username, config.host, config.port)
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSshConnection {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    username: String,
    #[serde(default)]
    private_key: Option<Secret>,
    #[serde(default)]
    passphrase: Option<Secret>,
    #[serde(default)]
    password: Option<Secret>,
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl TryFrom<RawSshConnection> for SshConnectionConfig {
    type Error = ModelError;

    fn try_from(raw: RawSshConnection) -> Result<Self, Self::Error> {
        if raw.host.trim().is_empty() {
            return Err(ModelError::MissingField("host"));
        }
        let auth = match (raw.private_key, raw.password) {
            (Some(key), _) if !key.is_empty() => SshAuth::PrivateKey {
                key,
                passphrase: raw.passphrase.filter(|p| !p.is_empty()),
            },
            (_, Some(password)) => SshAuth::Password(password),
            _ => return Err(ModelError::MissingField("privateKey or password")),
        };
        Ok(Self {
            host: raw.host,
            port: raw.port,
            username: raw.username,
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_key_auth_with_default_port() {
        let config: SshConnectionConfig = serde_json::from_str(
            r#"{"host":"db1","username":"backup","privateKey":"KEY","passphrase":"pp"}"#,
        )
        .unwrap();

        assert_eq!(config.port(), 22);
        assert_eq!(config.auth().method(), "publickey");
        assert_eq!(config.auth().secrets().count(), 2);
    }

    #[test]
    fn prefers_private_key_over_password() {
        let config: SshConnectionConfig = serde_json::from_str(
            r#"{"host":"db1","port":2222,"username":"u","privateKey":"KEY","password":"pw"}"#,
        )
        .unwrap();
        assert!(matches!(config.auth(), SshAuth::PrivateKey { .. }));
    }

    #[test]
    fn endpoint_defaults_to_port_22() {
        let endpoint: SshEndpoint =
            serde_json::from_str(r#"{"host":"db1","username":"backup","sshKeyId":"5"}"#).unwrap();
        assert_eq!(endpoint, SshEndpoint::new("db1", 22, "backup"));
    }

    #[test]
    fn rejects_missing_credentials() {
        let error = serde_json::from_str::<SshConnectionConfig>(r#"{"host":"db1","username":"u"}"#)
            .unwrap_err();
        assert!(error.to_string().contains("privateKey or password"));
    }

    #[test]
    fn debug_and_display_hide_credentials() {
        let config = SshConnectionConfig::with_password("10.0.0.5", 22, "root", "pw-123".into());
        assert!(!format!("{config:?}").contains("pw-123"));
        assert_eq!(config.display_target().to_string(), "root@10.0.0.5:22");
    }

    #[test]
    fn display_brackets_ipv6_hosts() {
        let config = SshConnectionConfig::with_password("2001:db8::1", 22, "root", "pw".into());
        assert_eq!(config.display_target().to_string(), "root@[2001:db8::1]:22");
    }
}
