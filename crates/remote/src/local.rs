//! Commands spawned on the engine host (pull mode).

use std::process::Stdio;

use async_trait::async_trait;
use logging::trace_cmd;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::channel::{
    CommandChannel, CommandRequest, OUTPUT_BUFFER, OutputEvent, OutputStream, OutputWriter,
};
use crate::error::RemoteError;

const READ_CHUNK: usize = 8 * 1024;

/// Spawns commands as local child processes.
///
/// The program and arguments are passed to the OS directly, without a shell.
/// Secrets travel in the child's environment only.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalProcess;

impl LocalProcess {
    /// Creates the local channel.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandChannel for LocalProcess {
    async fn start(&mut self, request: CommandRequest) -> Result<OutputStream, RemoteError> {
        let program = request.line.program().to_owned();
        let mut command = Command::new(&program);
        command
            .args(request.line.arguments())
            .envs(request.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|source| RemoteError::Spawn { program, source })?;
        trace_cmd!(venue = "local", pid = ?child.id(), "started {}", request.label);

        let (writer, stream) = OutputStream::pair(OUTPUT_BUFFER);
        tokio::spawn(pump(child, writer));
        Ok(stream)
    }
}

async fn pump(mut child: Child, writer: OutputWriter) {
    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.start_kill();
        writer.send(OutputEvent::Exit(None)).await;
        return;
    };

    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        let event = tokio::select! {
            () = writer.aborted() => {
                let _ = child.start_kill();
                return;
            }
            chunk = read_chunk(&mut stdout, &mut out_buf), if out_open => {
                out_open = chunk.is_some();
                chunk.map(OutputEvent::Stdout)
            }
            chunk = read_chunk(&mut stderr, &mut err_buf), if err_open => {
                err_open = chunk.is_some();
                chunk.map(OutputEvent::Stderr)
            }
        };
        if let Some(event) = event
            && !writer.send(event).await
        {
            let _ = child.start_kill();
            return;
        }
    }

    let exit_code = tokio::select! {
        () = writer.aborted() => {
            let _ = child.start_kill();
            return;
        }
        status = child.wait() => status
            .ok()
            .and_then(|status| status.code())
            .and_then(|code| u32::try_from(code).ok()),
    };
    trace_cmd!(venue = "local", ?exit_code, "process exited");
    writer.send(OutputEvent::Exit(exit_code)).await;
}

/// Reads one chunk; `None` at end of stream or on a read error.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Option<Vec<u8>> {
    match reader.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(read) => Some(buf[..read].to_vec()),
    }
}
