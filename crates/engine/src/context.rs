//! Per-invocation inputs that are not part of the job itself.

use logging::{CallbackSink, LogSink, Redactor};
use model::ExecutionLog;
use tokio_util::sync::CancellationToken;

/// Cancellation and live log delivery for one job invocation.
#[derive(Default)]
pub struct JobContext {
    /// Cancelling the token aborts the running command and fails the job.
    pub cancel: CancellationToken,
    /// Receives every transcript entry as it is produced.
    pub sink: Option<Box<dyn LogSink>>,
    /// Values masked in every transcript entry and error of the job.
    pub redactor: Redactor,
}

impl JobContext {
    /// A context with a fresh token and no live sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a live sink.
    #[must_use]
    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Attaches a callback invoked with every entry.
    #[must_use]
    pub fn on_log<F>(self, callback: F) -> Self
    where
        F: FnMut(&ExecutionLog) + Send + 'static,
    {
        self.with_sink(CallbackSink::new(callback))
    }

    /// Uses `token` for cancellation.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("sink", &self.sink.is_some())
            .field("protected", &self.redactor.len())
            .finish()
    }
}
