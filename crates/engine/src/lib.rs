#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` turns a job description into a finished [`model::BackupResult`].
//! It is layered in three parts:
//!
//! - [`BackupExecutor`] owns one session, dispatches synthesized commands to
//!   the SSH host or the local machine, and records a redacted transcript;
//! - the [`operations`] module runs backup (with prune), restore, and the two
//!   listings on a connected executor;
//! - [`resolve_ssh_config`] turns a credential reference into a connection
//!   configuration through a [`secrets::SecretResolver`];
//! - [`JobRunner`] connects, calls one operation, and closes the session on
//!   every exit path.
//!
//! # Design
//!
//! Each invocation builds its own executor, so concurrent jobs share nothing
//! but the runner's configuration. Connection failures are results, not
//! errors: backup and restore return a failed [`model::BackupResult`] with a
//! single `"Failed to connect to SSH server"` entry, while the listings
//! return [`EngineError::ConnectionFailed`].
//!
//! Pull-mode backups keep their session open after returning. The runner
//! hands it to the caller as a [`SessionLease`] whose
//! [`owner`](SessionLease::owner) is [`TeardownOwner::RemotePuller`]; every
//! other invocation is disconnected before the runner returns.
//!
//! # Invariants
//!
//! - Transcript entries are delivered to the job's sink in emission order.
//! - SSH credentials, repository passwords, and destination keys are
//!   registered with the executor's redactor before any command runs.
//! - A cancelled or timed-out command yields `exit_code = None`; it never
//!   panics and never counts as success.
//!
//! # Examples
//!
//! ```no_run
//! use engine::{EngineConfig, JobContext, JobRunner};
//! use model::{BackupJobConfig, SshConnectionConfig};
//!
//! # async fn demo(ssh: SshConnectionConfig, job: BackupJobConfig) {
//! let runner = JobRunner::new(EngineConfig::from_env());
//! let context = JobContext::new().on_log(|entry| eprintln!("[{}] {}", entry.kind, entry.message));
//! let run = runner.run_backup_job(&ssh, &job, context).await;
//! if let Some(lease) = run.lease {
//!     lease.release().await;
//! }
//! println!("success: {}", run.result.success);
//! # }
//! ```

mod config;
mod context;
mod error;
mod executor;
pub mod operations;
mod runner;

pub use config::{
    COMMAND_TIMEOUT_ENV, CONNECT_TIMEOUT_ENV, DEFAULT_LOG_QUEUE, EngineConfig, EngineConfigBuilder,
    KEEPALIVE_ENV, LOG_QUEUE_ENV,
};
pub use context::JobContext;
pub use error::{EngineError, EngineResult};
pub use executor::BackupExecutor;
pub use runner::{
    BackupRun, Connector, JobRunner, SessionLease, SshConnector, TeardownOwner, list_job_files,
    list_job_snapshots, resolve_ssh_config, run_backup_job, run_restore_job,
};
