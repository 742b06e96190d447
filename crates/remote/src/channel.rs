//! The command channel seam shared by SSH sessions and local processes.

use async_trait::async_trait;
use command::{CommandLine, Environment, SynthesizedCommand};
use model::{CommandResult, SshConnectionConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RemoteError;

/// Number of output chunks buffered between a running command and its reader.
pub const OUTPUT_BUFFER: usize = 64;

/// One piece of output from a running command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// Bytes written to stdout.
    Stdout(Vec<u8>),
    /// Bytes written to stderr.
    Stderr(Vec<u8>),
    /// The command finished; `None` when no exit status was reported.
    Exit(Option<u32>),
}

/// A command to start, with the environment it needs.
#[derive(Clone, Debug)]
pub struct CommandRequest {
    /// Program and arguments.
    pub line: CommandLine,
    /// Variables exported to the command. Values are secret.
    pub env: Environment,
    /// Log-safe description of the command.
    pub label: String,
}

impl CommandRequest {
    /// A request without extra environment, labelled by its program.
    #[must_use]
    pub fn new(line: CommandLine) -> Self {
        let label = line.program().to_owned();
        Self {
            line,
            env: Environment::new(),
            label,
        }
    }

    /// Runs `script` through `sh -c`.
    #[must_use]
    pub fn shell(script: impl Into<String>) -> Self {
        let mut request = Self::new(CommandLine::new("sh").arg("-c").arg(script));
        request.label = "sh".to_owned();
        request
    }

    /// Attaches an environment.
    #[must_use]
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Replaces the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl From<SynthesizedCommand> for CommandRequest {
    fn from(command: SynthesizedCommand) -> Self {
        let label = command.label();
        Self {
            line: command.line,
            env: command.env,
            label,
        }
    }
}

/// Producer half of an [`OutputStream`].
#[derive(Debug)]
pub struct OutputWriter {
    events: mpsc::Sender<OutputEvent>,
    abort: CancellationToken,
}

impl OutputWriter {
    /// Forwards one event, waiting for buffer space.
    ///
    /// Returns `false` once the reader has gone away or aborted the command;
    /// the producer should stop the command at that point.
    pub async fn send(&self, event: OutputEvent) -> bool {
        tokio::select! {
            biased;
            () = self.abort.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    /// Resolves when the reader aborts the command or drops the stream.
    pub async fn aborted(&self) {
        self.abort.cancelled().await;
    }

    /// Reports whether the reader aborted the command.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// Consumer half: the output of one running command.
///
/// Dropping the stream aborts the command.
#[derive(Debug)]
pub struct OutputStream {
    events: mpsc::Receiver<OutputEvent>,
    abort: CancellationToken,
}

impl OutputStream {
    /// Creates a connected writer/stream pair.
    #[must_use]
    pub fn pair(capacity: usize) -> (OutputWriter, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let abort = CancellationToken::new();
        (
            OutputWriter {
                events: tx,
                abort: abort.clone(),
            },
            Self { events: rx, abort },
        )
    }

    /// Waits for the next event; `None` once the producer is done.
    pub async fn next(&mut self) -> Option<OutputEvent> {
        self.events.recv().await
    }

    /// Asks the producer to stop the command.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Drains the stream into a [`CommandResult`].
    pub async fn collect(mut self) -> CommandResult {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        while let Some(event) = self.next().await {
            match event {
                OutputEvent::Stdout(bytes) => stdout.extend_from_slice(&bytes),
                OutputEvent::Stderr(bytes) => stderr.extend_from_slice(&bytes),
                OutputEvent::Exit(code) => exit_code = code,
            }
        }
        CommandResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.abort.cancel();
    }
}

/// Something that can start commands and stream their output.
#[async_trait]
pub trait CommandChannel: Send {
    /// Starts `request` and returns its output stream.
    async fn start(&mut self, request: CommandRequest) -> Result<OutputStream, RemoteError>;
}

/// Lifecycle of an SSH session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; the initial and final state.
    Disconnected,
    /// Handshake or authentication in progress.
    Connecting,
    /// Authenticated and able to start commands.
    Connected,
}

/// A command channel bound to one remote host.
#[async_trait]
pub trait Transport: CommandChannel {
    /// Connects and authenticates; returns `false` on any failure.
    async fn connect(&mut self, config: &SshConnectionConfig) -> bool;

    /// Closes the connection. Safe to call in any state.
    async fn disconnect(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Reports whether commands can be started.
    fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_joins_output() {
        let (writer, stream) = OutputStream::pair(4);
        let producer = tokio::spawn(async move {
            assert!(writer.send(OutputEvent::Stdout(b"hello ".to_vec())).await);
            assert!(writer.send(OutputEvent::Stderr(b"warn\n".to_vec())).await);
            assert!(writer.send(OutputEvent::Stdout(b"world".to_vec())).await);
            assert!(writer.send(OutputEvent::Exit(Some(3))).await);
        });
        let result = stream.collect().await;
        producer.await.unwrap();

        assert_eq!(result.stdout, "hello world");
        assert_eq!(result.stderr, "warn\n");
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn missing_exit_is_interrupted() {
        let (writer, stream) = OutputStream::pair(1);
        drop(writer);
        assert!(stream.collect().await.interrupted());
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_the_writer() {
        let (writer, stream) = OutputStream::pair(1);
        drop(stream);
        assert!(writer.is_aborted());
        assert!(!writer.send(OutputEvent::Exit(Some(0))).await);
    }

    #[test]
    fn synthesized_commands_keep_their_label() {
        let synthesized =
            SynthesizedCommand::remote(CommandLine::new("restic").args(["snapshots", "--json"]));
        let request = CommandRequest::from(synthesized);
        assert_eq!(request.label, "restic snapshots");
        assert_eq!(CommandRequest::shell("uptime").line.render(), "sh -c uptime");
    }
}
