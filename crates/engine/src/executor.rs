//! One job's connection, command dispatch, and transcript.

use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use command::{IDENTITY_PLACEHOLDER, SynthesizedCommand, Venue};
use logging::{LogRecorder, trace_cmd};
use model::{
    CONNECTION_FAILED_MESSAGE, CommandResult, ExecutionLog, LogKind, Secret, SshConnectionConfig,
};
use remote::{
    CommandChannel, CommandRequest, IdentityFile, LineSplitter, LocalProcess, OutputEvent,
    OutputStream, RemoteError, SessionState, SshSession, Transport,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::JobContext;

/// Runs a job's commands and records everything they print.
///
/// The executor owns one [`Transport`] to the job's host plus a local
/// channel for pull-mode commands. Each output line is redacted, classified,
/// streamed to the job's sink, and kept for the final
/// [`BackupResult`](model::BackupResult).
pub struct BackupExecutor {
    transport: Box<dyn Transport>,
    local: Box<dyn CommandChannel>,
    pull_mode: bool,
    command_timeout: Option<Duration>,
    cancel: CancellationToken,
    recorder: LogRecorder,
    session: Option<SshConnectionConfig>,
}

impl BackupExecutor {
    /// Wraps `transport`; local commands are spawned with [`LocalProcess`].
    pub fn new(
        transport: Box<dyn Transport>,
        pull_mode: bool,
        config: &EngineConfig,
        context: JobContext,
    ) -> Self {
        let JobContext {
            cancel,
            sink,
            redactor,
        } = context;
        Self {
            transport,
            local: Box::new(LocalProcess::new()),
            pull_mode,
            command_timeout: config.timeouts().command_timeout(),
            cancel,
            recorder: LogRecorder::new(redactor, sink),
            session: None,
        }
    }

    /// An executor over a fresh [`SshSession`].
    pub fn over_ssh(config: &EngineConfig, pull_mode: bool, context: JobContext) -> Self {
        Self::new(
            Box::new(SshSession::new(config.timeouts())),
            pull_mode,
            config,
            context,
        )
    }

    /// Replaces the channel used for [`Venue::Local`] commands.
    #[must_use]
    pub fn with_local_channel(mut self, local: Box<dyn CommandChannel>) -> Self {
        self.local = local;
        self
    }

    /// Whether the job pulls data to the engine host.
    #[must_use]
    pub const fn pull_mode(&self) -> bool {
        self.pull_mode
    }

    /// Whether the SSH session is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// The transcript so far.
    #[must_use]
    pub fn logs(&self) -> &[ExecutionLog] {
        self.recorder.entries()
    }

    /// Marks values that must never appear in the transcript.
    pub fn protect<'a>(&mut self, secrets: impl IntoIterator<Item = &'a Secret>) {
        self.recorder.redactor_mut().register_all(secrets);
    }

    /// Masks every protected value in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        self.recorder.redactor().redact(text)
    }

    /// Appends one transcript entry.
    pub async fn log(&mut self, kind: LogKind, message: impl AsRef<str>) {
        self.recorder.emit(kind, message).await;
    }

    /// Opens the SSH session; `false` on any failure or on cancellation.
    pub async fn connect(&mut self, config: &SshConnectionConfig) -> bool {
        self.protect(config.auth().secrets());
        let target = config.display_target().to_string();
        self.log(LogKind::Ssh, format!("Connecting to {target}")).await;

        let connected = tokio::select! {
            () = self.cancel.cancelled() => false,
            connected = self.transport.connect(config) => connected,
        };
        if connected {
            self.session = Some(config.clone());
            self.log(LogKind::Ssh, format!("Connected to {target}")).await;
        } else {
            self.transport.disconnect().await;
            self.log(
                LogKind::Error,
                format!("{CONNECTION_FAILED_MESSAGE} ({target})"),
            )
            .await;
        }
        connected
    }

    /// Closes the SSH session. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        let was_open = self.transport.state() != SessionState::Disconnected;
        self.transport.disconnect().await;
        if was_open && let Some(session) = &self.session {
            let message = format!("Disconnected from {}", session.display_target());
            self.log(LogKind::Ssh, message).await;
        }
    }

    /// Hands the transport to a new owner, leaving a closed stand-in behind.
    pub(crate) fn take_transport(&mut self) -> Box<dyn Transport> {
        mem::replace(&mut self.transport, Box::new(Detached))
    }

    /// Runs one command to completion.
    ///
    /// Output lines are streamed into the transcript as they arrive. Start
    /// failures, cancellation, and the command time limit all produce a
    /// result without an exit code and with a redacted explanation in stderr.
    pub async fn run(&mut self, command: SynthesizedCommand) -> CommandResult {
        self.protect(command.env.values());
        let label = command.label();
        let venue = command.venue;
        trace_cmd!(venue = venue.name(), vars = command.env.len(), "dispatching {label}");
        self.log(LogKind::Cmd, format!("Running {label} ({})", venue.name()))
            .await;

        let mut request = CommandRequest::from(command);
        let identity = if needs_identity(&request) {
            match self.stage_identity() {
                Ok(identity) => {
                    let path = identity.path().to_string_lossy().into_owned();
                    request.line = request.line.substitute(IDENTITY_PLACEHOLDER, &path);
                    Some(identity)
                }
                Err(err) => return self.not_started(&label, &err).await,
            }
        } else {
            None
        };

        let started = match venue {
            Venue::Remote => self.transport.start(request).await,
            Venue::Local => self.local.start(request).await,
        };
        let result = match started {
            Ok(stream) => self.drain(stream, &label).await,
            Err(err) => self.not_started(&label, &err).await,
        };
        drop(identity);
        trace_cmd!(exit_code = ?result.exit_code, "finished {label}");
        result
    }

    async fn drain(&mut self, mut stream: OutputStream, label: &str) -> CommandResult {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut out_lines = LineSplitter::new();
        let mut err_lines = LineSplitter::new();
        let deadline = self.command_timeout.map(|limit| Instant::now() + limit);
        let cancel = self.cancel.clone();
        let mut interruption = None;

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    interruption = Some("cancelled".to_owned());
                    break;
                }
                () = expiry(deadline) => {
                    let limit = self.command_timeout.unwrap_or_default();
                    interruption = Some(format!("timed out after {}s", limit.as_secs()));
                    break;
                }
                event = stream.next() => event,
            };
            match event {
                None => break,
                Some(OutputEvent::Stdout(chunk)) => {
                    for line in out_lines.push(&chunk) {
                        self.recorder.emit_line(&line).await;
                    }
                    stdout.extend_from_slice(&chunk);
                }
                Some(OutputEvent::Stderr(chunk)) => {
                    for line in err_lines.push(&chunk) {
                        self.recorder.emit_line(&line).await;
                    }
                    stderr.extend_from_slice(&chunk);
                }
                Some(OutputEvent::Exit(code)) => exit_code = code,
            }
        }
        for tail in [out_lines.finish(), err_lines.finish()].into_iter().flatten() {
            self.recorder.emit_line(&tail).await;
        }

        let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
        if let Some(reason) = interruption {
            stream.abort();
            exit_code = None;
            let message = format!("{label} {reason}");
            self.log(LogKind::Error, &message).await;
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&message);
        }
        CommandResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr,
            exit_code,
        }
    }

    async fn not_started(&mut self, label: &str, err: &RemoteError) -> CommandResult {
        let message = self.redact(&format!("Failed to start {label}: {err}"));
        self.log(LogKind::Error, &message).await;
        CommandResult {
            stdout: String::new(),
            stderr: message,
            exit_code: None,
        }
    }

    fn stage_identity(&self) -> Result<IdentityFile, RemoteError> {
        let session = self.session.as_ref().ok_or(RemoteError::NotConnected)?;
        IdentityFile::for_auth(session.auth())?.ok_or_else(|| RemoteError::InvalidKey {
            reason: "session authenticates without a private key".to_owned(),
        })
    }
}

impl std::fmt::Debug for BackupExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupExecutor")
            .field("state", &self.transport.state())
            .field("pull_mode", &self.pull_mode)
            .field("command_timeout", &self.command_timeout)
            .field("logs", &self.recorder.entries().len())
            .finish_non_exhaustive()
    }
}

fn needs_identity(request: &CommandRequest) -> bool {
    std::iter::once(request.line.program())
        .chain(request.line.arguments().iter().map(String::as_str))
        .any(|word| word.contains(IDENTITY_PLACEHOLDER))
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Stand-in left behind once the transport has been handed off.
struct Detached;

#[async_trait]
impl CommandChannel for Detached {
    async fn start(&mut self, _request: CommandRequest) -> Result<OutputStream, RemoteError> {
        Err(RemoteError::NotConnected)
    }
}

#[async_trait]
impl Transport for Detached {
    async fn connect(&mut self, _config: &SshConnectionConfig) -> bool {
        false
    }

    async fn disconnect(&mut self) {}

    fn state(&self) -> SessionState {
        SessionState::Disconnected
    }
}
