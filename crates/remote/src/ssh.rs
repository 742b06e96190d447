//! russh-backed SSH sessions.
//!
//! A session moves `Disconnected → Connecting → Connected → Disconnected` and
//! never reconnects. Each command gets its own channel; output is pumped by a
//! spawned task so long transfers never block other sessions.

use std::sync::Arc;

use async_trait::async_trait;
use logging::trace_ssh;
use model::{CommandResult, Secret, SshAuth, SshConnectionConfig};
use russh::client::{self, Handle, Msg};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use zeroize::Zeroizing;

use crate::channel::{
    CommandChannel, CommandRequest, OUTPUT_BUFFER, OutputEvent, OutputStream, OutputWriter,
    SessionState, Transport,
};
use crate::error::RemoteError;
use crate::timeout::TimeoutConfig;

/// Missed keepalive replies tolerated before the session is dropped.
const KEEPALIVE_MAX: usize = 3;

/// Extended-data stream number of stderr.
const STDERR_STREAM: u32 = 1;

/// Accepts every host key and records its fingerprint.
struct HostKeyLogger {
    host: String,
}

impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        trace_ssh!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting host key"
        );
        Ok(true)
    }
}

/// One SSH connection, exclusively owned by a job invocation.
pub struct SshSession {
    timeouts: TimeoutConfig,
    state: SessionState,
    handle: Option<Handle<HostKeyLogger>>,
    target: String,
}

impl SshSession {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self {
            timeouts,
            state: SessionState::Disconnected,
            handle: None,
            target: String::new(),
        }
    }

    /// `user@host:port` of the last connect attempt.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Connects and authenticates, reporting why a failure happened.
    pub async fn try_connect(&mut self, config: &SshConnectionConfig) -> Result<(), RemoteError> {
        if self.state == SessionState::Connected {
            return Ok(());
        }
        self.target = config.display_target().to_string();
        self.state = SessionState::Connecting;
        trace_ssh!(host = %self.target, method = config.auth().method(), "connecting");

        let attempt = open(config, &self.timeouts, &self.target);
        let outcome = match self.timeouts.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(RemoteError::ConnectTimedOut {
                        target: self.target.clone(),
                        elapsed: limit,
                    })
                }),
            None => attempt.await,
        };

        match outcome {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Connected;
                trace_ssh!(host = %self.target, "connected");
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Runs `command` through `sh -c` and waits for it to finish.
    ///
    /// Output is collected in full. The command limit of the session's
    /// [`TimeoutConfig`] applies; expiry yields an interrupted result.
    pub async fn execute_command(&mut self, command: &str) -> Result<CommandResult, RemoteError> {
        let stream = self.start(CommandRequest::shell(command)).await?;
        let Some(limit) = self.timeouts.command_timeout() else {
            return Ok(stream.collect().await);
        };
        Ok(tokio::time::timeout(limit, stream.collect())
            .await
            .unwrap_or_else(|_| CommandResult {
                stdout: String::new(),
                stderr: format!("command timed out after {}s", limit.as_secs()),
                exit_code: None,
            }))
    }

    /// Closes the connection. Safe in every state.
    pub async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
            {
                trace_ssh!(host = %self.target, error = %err, "disconnect reported an error");
            } else {
                trace_ssh!(host = %self.target, "disconnected");
            }
        }
        self.state = SessionState::Disconnected;
    }
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandChannel for SshSession {
    async fn start(&mut self, request: CommandRequest) -> Result<OutputStream, RemoteError> {
        let handle = match (&self.handle, self.state) {
            (Some(handle), SessionState::Connected) => handle,
            _ => return Err(RemoteError::NotConnected),
        };
        let channel = handle
            .channel_open_session()
            .await
            .map_err(RemoteError::channel)?;

        trace_ssh!(host = %self.target, vars = request.env.len(), "exec {}", request.label);
        if request.env.is_empty() {
            channel
                .exec(true, request.line.render())
                .await
                .map_err(RemoteError::channel)?;
        } else {
            // The environment is fed over stdin so secrets stay out of argv.
            channel
                .exec(true, "sh -s")
                .await
                .map_err(RemoteError::channel)?;
            let mut script = Zeroizing::new(request.env.export_script());
            script.push_str(&request.line.render());
            script.push('\n');
            channel
                .data(script.as_bytes())
                .await
                .map_err(RemoteError::channel)?;
            channel.eof().await.map_err(RemoteError::channel)?;
        }

        let (writer, stream) = OutputStream::pair(OUTPUT_BUFFER);
        tokio::spawn(pump(channel, writer));
        Ok(stream)
    }
}

#[async_trait]
impl Transport for SshSession {
    async fn connect(&mut self, config: &SshConnectionConfig) -> bool {
        match self.try_connect(config).await {
            Ok(()) => true,
            Err(err) => {
                trace_ssh!(host = %self.target, error = %err, "connect failed");
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        self.close().await;
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

async fn open(
    config: &SshConnectionConfig,
    timeouts: &TimeoutConfig,
    target: &str,
) -> Result<Handle<HostKeyLogger>, RemoteError> {
    let client_config = client::Config {
        inactivity_timeout: None,
        keepalive_interval: timeouts.keepalive_interval(),
        keepalive_max: KEEPALIVE_MAX,
        ..client::Config::default()
    };
    let handler = HostKeyLogger {
        host: target.to_owned(),
    };
    let failed = |err: russh::Error| RemoteError::ConnectionFailed {
        target: target.to_owned(),
        reason: err.to_string(),
    };

    let mut handle = client::connect(
        Arc::new(client_config),
        (config.host(), config.port()),
        handler,
    )
    .await
    .map_err(failed)?;

    let auth = config.auth();
    let accepted = match auth {
        SshAuth::PrivateKey { key, passphrase } => {
            let passphrase = passphrase
                .as_ref()
                .filter(|passphrase| !passphrase.is_empty())
                .map(Secret::expose);
            let key = decode_secret_key(key.expose(), passphrase).map_err(|err| {
                RemoteError::InvalidKey {
                    reason: err.to_string(),
                }
            })?;
            let hash = handle
                .best_supported_rsa_hash()
                .await
                .map_err(failed)?
                .flatten();
            handle
                .authenticate_publickey(
                    config.username(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                )
                .await
                .map_err(failed)?
                .success()
        }
        SshAuth::Password(password) => handle
            .authenticate_password(config.username(), password.expose())
            .await
            .map_err(failed)?
            .success(),
    };

    if !accepted {
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        return Err(RemoteError::AuthenticationRejected {
            target: target.to_owned(),
            method: auth.method(),
        });
    }
    Ok(handle)
}

async fn pump(mut channel: Channel<Msg>, writer: OutputWriter) {
    let mut exit_code = None;
    loop {
        let message = tokio::select! {
            () = writer.aborted() => {
                let _ = channel.close().await;
                return;
            }
            message = channel.wait() => message,
        };
        let Some(message) = message else {
            break;
        };
        let event = match message {
            ChannelMsg::Data { data } => OutputEvent::Stdout(data.to_vec()),
            ChannelMsg::ExtendedData { data, ext } if ext == STDERR_STREAM => {
                OutputEvent::Stderr(data.to_vec())
            }
            ChannelMsg::ExitStatus { exit_status } => {
                exit_code = Some(exit_status);
                continue;
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                trace_ssh!(signal = ?signal_name, "remote command killed by signal");
                continue;
            }
            _ => continue,
        };
        if !writer.send(event).await {
            let _ = channel.close().await;
            return;
        }
    }
    writer.send(OutputEvent::Exit(exit_code)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::TimeoutSetting;

    fn unreachable_config() -> SshConnectionConfig {
        // Port 1 on loopback is closed on any sane test host.
        SshConnectionConfig::with_password("127.0.0.1", 1, "backup", Secret::new("pw"))
    }

    #[tokio::test]
    async fn closed_port_fails_without_panicking() {
        let mut session = SshSession::new(TimeoutConfig {
            connect: TimeoutSetting::from_seconds(5),
            ..TimeoutConfig::default()
        });
        assert!(!Transport::connect(&mut session, &unreachable_config()).await);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.target(), "backup@127.0.0.1:1");
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut session = SshSession::new(TimeoutConfig::default());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn commands_require_a_connection() {
        let mut session = SshSession::new(TimeoutConfig::default());
        let err = session.execute_command("true").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotConnected));
    }

    #[tokio::test]
    async fn connection_errors_never_carry_the_password() {
        let mut session = SshSession::new(TimeoutConfig::default());
        let config = SshConnectionConfig::with_password("127.0.0.1", 1, "backup", Secret::new("hunter2-secret"));
        let err = session.try_connect(&config).await.unwrap_err();
        assert!(!err.to_string().contains("hunter2-secret"));
    }
}
