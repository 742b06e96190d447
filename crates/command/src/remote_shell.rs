//! The `ssh` transport handed to a local rsync with `-e` in pull mode.

use model::{SshAuth, SshConnectionConfig};

/// Stand-in for the private key file path, replaced by the executor at dispatch.
pub const IDENTITY_PLACEHOLDER: &str = "{{SSH_IDENTITY_FILE}}";

/// Builder for the remote-shell string rsync uses to reach the SSH host.
///
/// Host keys are not verified: the engine's own session already accepted the
/// host, and pull transfers must run without an interactive prompt.
#[derive(Clone, Debug)]
pub struct RemoteShell {
    program: String,
    port: Option<u16>,
    identity_file: Option<String>,
    batch_mode: bool,
    options: Vec<String>,
}

impl RemoteShell {
    /// Starts from plain `ssh` with batch mode enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "ssh".to_owned(),
            port: None,
            identity_file: None,
            batch_mode: true,
            options: Vec::new(),
        }
    }

    /// Configures the shell for the session's host and authentication method.
    ///
    /// Key authentication points `-i` at [`IDENTITY_PLACEHOLDER`]; password
    /// authentication disables batch mode so `sshpass` can answer the prompt.
    #[must_use]
    pub fn for_session(ssh: &SshConnectionConfig) -> Self {
        let mut shell = Self::new();
        shell.set_port(ssh.port());
        match ssh.auth() {
            SshAuth::PrivateKey { .. } => shell.set_identity_file(IDENTITY_PLACEHOLDER),
            SshAuth::Password(_) => shell.set_batch_mode(false),
        }
        shell
    }

    /// Sets the port passed with `-p`.
    pub const fn set_port(&mut self, port: u16) {
        self.port = Some(port);
    }

    /// Sets the identity file passed with `-i`.
    pub fn set_identity_file(&mut self, path: impl Into<String>) {
        self.identity_file = Some(path.into());
    }

    /// Enables or disables `-oBatchMode=yes`.
    pub const fn set_batch_mode(&mut self, enabled: bool) {
        self.batch_mode = enabled;
    }

    /// Appends a raw ssh option.
    pub fn push_option(&mut self, option: impl Into<String>) {
        self.options.push(option.into());
    }

    /// Renders the words of the remote shell.
    #[must_use]
    pub fn words(&self) -> Vec<String> {
        let mut words = vec![self.program.clone()];
        if let Some(port) = self.port {
            words.push("-p".to_owned());
            words.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            words.push("-i".to_owned());
            words.push(identity.clone());
        }
        words.push("-oStrictHostKeyChecking=no".to_owned());
        words.push("-oUserKnownHostsFile=/dev/null".to_owned());
        if self.batch_mode {
            words.push("-oBatchMode=yes".to_owned());
        }
        words.extend(self.options.iter().cloned());
        words
    }

    /// Renders the value of rsync's `-e` option.
    #[must_use]
    pub fn render(&self) -> String {
        self.words().join(" ")
    }
}

impl Default for RemoteShell {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats `user@host:path`, bracketing IPv6 literals.
#[must_use]
pub fn remote_spec(ssh: &SshConnectionConfig, path: &str) -> String {
    let host = ssh.host();
    if host.contains(':') && !host.starts_with('[') {
        format!("{}@[{host}]:{path}", ssh.username())
    } else {
        format!("{}@{host}:{path}", ssh.username())
    }
}
