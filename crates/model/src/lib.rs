#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `model` holds the plain data exchanged between the backhaul crates: the SSH
//! target of a job, the job description itself, the snapshots and file
//! entries reported by the backup tools, and the results handed back to the
//! caller.
//!
//! # Invariants
//!
//! - [`Secret`] values never render through `Debug` and are wiped from memory
//!   when dropped.
//! - [`BackupJobConfig::validate`] rejects borg/restic jobs without a
//!   repository password.
//! - [`JobRecord::to_definition`] reverses [`JobDefinition::to_record`] field
//!   for field.

mod error;
mod job;
mod log;
mod record;
mod result;
mod secret;
mod snapshot;
mod ssh;

pub use error::ModelError;
pub use job::{
    BackupJobConfig, DestinationCredentials, DestinationType, RestoreJobConfig, RetentionPolicy,
    Tool, TransferMode,
};
pub use log::{ExecutionLog, LogKind};
pub use record::{JobDefinition, JobRecord, JobStats, LocationBinding};
pub use result::{BackupResult, CONNECTION_FAILED_MESSAGE, CommandResult};
pub use secret::Secret;
pub use snapshot::{EntryKind, FileEntry, Snapshot};
pub use ssh::{DisplayTarget, SshAuth, SshConnectionConfig, SshEndpoint};
