//! Live consumers of the job transcript.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use model::ExecutionLog;
use tokio::sync::mpsc;

/// Receives transcript entries as they are produced.
///
/// `deliver` is awaited before the next entry is produced, so a slow sink
/// slows the job down instead of losing or reordering entries.
#[async_trait]
pub trait LogSink: Send {
    /// Accepts one entry.
    async fn deliver(&mut self, log: &ExecutionLog);
}

/// Forwards entries over a bounded tokio channel.
///
/// A full channel suspends the producer until the consumer catches up. Once
/// the receiver is dropped the sink detaches and discards further entries.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<ExecutionLog>,
    detached: bool,
}

impl ChannelSink {
    /// Wraps an existing sender.
    #[must_use]
    pub const fn new(sender: mpsc::Sender<ExecutionLog>) -> Self {
        Self {
            sender,
            detached: false,
        }
    }

    /// Creates a sink together with the receiving half of a channel of `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ExecutionLog>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }

    /// Reports whether the receiving half has gone away.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }
}

#[async_trait]
impl LogSink for ChannelSink {
    async fn deliver(&mut self, log: &ExecutionLog) {
        if self.detached {
            return;
        }
        if self.sender.send(log.clone()).await.is_err() {
            self.detached = true;
            crate::trace_job!("transcript receiver closed; live streaming detached");
        }
    }
}

/// Invokes a closure for every entry.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&ExecutionLog) + Send,
{
    /// Wraps `callback`.
    pub const fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> LogSink for CallbackSink<F>
where
    F: FnMut(&ExecutionLog) + Send,
{
    async fn deliver(&mut self, log: &ExecutionLog) {
        (self.callback)(log);
    }
}

/// Stores every entry in a shared vector; cloned handles observe the same entries.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    entries: Arc<Mutex<Vec<ExecutionLog>>>,
}

impl CollectingSink {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything delivered so far.
    #[must_use]
    pub fn entries(&self) -> Vec<ExecutionLog> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LogSink for CollectingSink {
    async fn deliver(&mut self, log: &ExecutionLog) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(log.clone());
    }
}
