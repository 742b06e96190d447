#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `command` maps a backup job onto concrete borg, restic, or rsync command
//! lines and parses what those tools print back into the shared model.
//! Everything here is pure: no process is spawned and no clock is read.
//!
//! Each tool is a [`ToolAdapter`]; [`ToolAdapterExt::adapter`] selects the
//! adapter for a [`model::Tool`]. A synthesized command is a
//! [`SynthesizedCommand`]: an argument vector, an [`Environment`] holding the
//! repository target and credentials, and the [`Venue`] it must run in.
//!
//! # Invariants
//!
//! - Repository passwords and destination credentials are only ever placed in
//!   the [`Environment`], never in the argument vector.
//! - Every rsync invocation carries `--one-file-system` and the
//!   [`RSYNC_SYSTEM_EXCLUDES`].
//! - Pull-mode commands reference the private key only through
//!   [`IDENTITY_PLACEHOLDER`]; the executor substitutes a temporary file path
//!   at dispatch time.
//!
//! # Examples
//!
//! ```
//! use command::{Invocation, ToolAdapterExt, ToolOperation};
//! use model::{BackupJobConfig, DestinationType, SshConnectionConfig, Tool};
//!
//! let job = BackupJobConfig {
//!     job_id: "1".into(),
//!     job_name: "data".into(),
//!     tool: Tool::Restic,
//!     source_paths: vec!["/data".into()],
//!     destination_type: DestinationType::S3,
//!     destination_path: "bucket/path".into(),
//!     credentials: Default::default(),
//!     repo_password: Some("x".into()),
//!     retention: Default::default(),
//! };
//! let ssh = SshConnectionConfig::with_password("db1", 22, "backup", "pw".into());
//!
//! let command = Tool::Restic
//!     .adapter()
//!     .synthesize(&ToolOperation::Backup, &Invocation::new(&job, &ssh))?
//!     .expect("backup always produces a command");
//! assert_eq!(command.env.get("RESTIC_PASSWORD"), Some("x"));
//! assert!(command.line.arguments().iter().all(|arg| !arg.contains('x')));
//! # Ok::<(), command::SynthesisError>(())
//! ```

mod adapter;
mod borg;
mod error;
mod line;
mod remote_shell;
mod restic;
mod rsync;
mod stats;
mod target;

pub use adapter::{Invocation, ToolAdapter, ToolAdapterExt, ToolOperation};
pub use error::{ParseError, SynthesisError};
pub use line::{CommandLine, Environment, SynthesizedCommand, Venue, shell_quote};
pub use remote_shell::{IDENTITY_PLACEHOLDER, RemoteShell, remote_spec};
pub use rsync::{RSYNC_MIRROR_SNAPSHOT, RSYNC_SYSTEM_EXCLUDES};
pub use stats::ParsedStats;
