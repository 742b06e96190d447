//! The per-job transcript writer.

use std::fmt;
use std::mem;

use model::{ExecutionLog, LogKind};

use crate::classify::classify_line;
use crate::redact::Redactor;
use crate::sink::LogSink;

/// Redacts, timestamps, stores, and forwards transcript entries.
pub struct LogRecorder {
    redactor: Redactor,
    entries: Vec<ExecutionLog>,
    sink: Option<Box<dyn LogSink>>,
}

impl LogRecorder {
    /// Creates a recorder that masks with `redactor` and streams to `sink` when present.
    #[must_use]
    pub fn new(redactor: Redactor, sink: Option<Box<dyn LogSink>>) -> Self {
        Self {
            redactor,
            entries: Vec::new(),
            sink,
        }
    }

    /// The redactor applied to every entry.
    #[must_use]
    pub const fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Mutable access for registering secrets resolved after construction.
    pub const fn redactor_mut(&mut self) -> &mut Redactor {
        &mut self.redactor
    }

    /// Replaces the live sink, returning the previous one.
    pub fn set_sink(&mut self, sink: Option<Box<dyn LogSink>>) -> Option<Box<dyn LogSink>> {
        mem::replace(&mut self.sink, sink)
    }

    /// Records one entry of the given kind.
    pub async fn emit(&mut self, kind: LogKind, message: impl AsRef<str>) {
        let log = ExecutionLog::now(kind, self.redactor.redact(message.as_ref()));
        crate::trace_job!(kind = %log.kind, "{}", log.message);
        if let Some(sink) = self.sink.as_mut() {
            sink.deliver(&log).await;
        }
        self.entries.push(log);
    }

    /// Records one line of tool output, classified by [`classify_line`].
    ///
    /// Blank lines are dropped.
    pub async fn emit_line(&mut self, line: &str) {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return;
        }
        self.emit(classify_line(line), line).await;
    }

    /// Everything recorded so far, in emission order.
    #[must_use]
    pub fn entries(&self) -> &[ExecutionLog] {
        &self.entries
    }

    /// Moves the recorded entries out, leaving the transcript empty.
    pub fn take_entries(&mut self) -> Vec<ExecutionLog> {
        mem::take(&mut self.entries)
    }
}

impl fmt::Debug for LogRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecorder")
            .field("redactor", &self.redactor)
            .field("entries", &self.entries.len())
            .field("streaming", &self.sink.is_some())
            .finish()
    }
}
