#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `remote` runs synthesized commands and streams their output. Two channels
//! implement [`CommandChannel`]:
//!
//! - [`SshSession`], a russh client bound to one host, used for every push
//!   mode command and for borg/restic;
//! - [`LocalProcess`], which spawns commands on the engine host for rsync
//!   pull mode.
//!
//! # Design
//!
//! Starting a command returns an [`OutputStream`] fed by a spawned task, so
//! a backup that runs for hours only occupies its own session. Dropping the
//! stream, or calling [`OutputStream::abort`], stops the command: the SSH
//! channel is closed or the child process killed.
//!
//! Commands that need environment variables are started on the SSH host as
//! `sh -s`, with the `export` statements written to the channel's stdin.
//! Local commands receive their environment from the OS directly.
//!
//! # Invariants
//!
//! - [`Transport::connect`] never fails loudly: any error becomes `false`.
//! - [`Transport::disconnect`] is idempotent.
//! - Only command labels are traced; rendered command lines and environment
//!   values never reach a log.
//!
//! # Examples
//!
//! ```no_run
//! use model::{Secret, SshConnectionConfig};
//! use remote::{SshSession, TimeoutConfig, Transport};
//!
//! # async fn demo() -> Result<(), remote::RemoteError> {
//! let config = SshConnectionConfig::with_password("db1", 22, "backup", Secret::new("pw"));
//! let mut session = SshSession::new(TimeoutConfig::default());
//! if session.connect(&config).await {
//!     let result = session.execute_command("uptime").await?;
//!     println!("{}", result.stdout);
//!     session.disconnect().await;
//! }
//! # Ok(())
//! # }
//! ```

mod channel;
mod error;
mod identity;
mod lines;
mod local;
mod ssh;
mod timeout;

pub use channel::{
    CommandChannel, CommandRequest, OUTPUT_BUFFER, OutputEvent, OutputStream, OutputWriter,
    SessionState, Transport,
};
pub use error::RemoteError;
pub use identity::IdentityFile;
pub use lines::LineSplitter;
pub use local::LocalProcess;
pub use ssh::SshSession;
pub use timeout::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL, TimeoutConfig,
    TimeoutSetting,
};
