#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` carries the two output channels of a backup job:
//!
//! - the user-facing transcript, a sequence of [`model::ExecutionLog`]
//!   entries that are redacted by a [`Redactor`], classified by
//!   [`classify_line`], and streamed to a [`LogSink`] as they are produced;
//! - process diagnostics, emitted through `tracing` with `backhaul::*`
//!   targets and installed by [`init_tracing`].
//!
//! # Design
//!
//! [`LogRecorder`] owns the job's redactor, the aggregate transcript, and the
//! optional live sink. Every entry passes through the redactor before it is
//! stored or forwarded, so no other layer has to remember to mask secrets.
//!
//! # Invariants
//!
//! - Entries reach the sink in emission order, one at a time.
//! - A sink whose consumer has gone away detaches silently; the aggregate
//!   transcript is still complete.
//! - Registered secrets never appear in a stored or forwarded message.
//!
//! # Examples
//!
//! ```
//! use logging::{LogRecorder, Redactor};
//! use model::LogKind;
//!
//! # tokio_test_block(async {
//! let mut redactor = Redactor::new();
//! redactor.register("hunter2");
//!
//! let mut recorder = LogRecorder::new(redactor, None);
//! recorder.emit(LogKind::Cmd, "export RESTIC_PASSWORD=hunter2").await;
//! assert_eq!(recorder.entries()[0].message, "export RESTIC_PASSWORD=****");
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod classify;
mod recorder;
mod redact;
mod sink;
mod tracing_bridge;
mod tracing_macros;

pub use classify::classify_line;
pub use recorder::LogRecorder;
pub use redact::{REDACTED, Redactor};
pub use sink::{CallbackSink, ChannelSink, CollectingSink, LogSink};
pub use tracing_bridge::{LOG_ENV_VAR, default_directives, init_tracing};
