//! The per-tool capability shared by rsync, borg, and restic.

use model::{BackupJobConfig, CommandResult, FileEntry, Snapshot, SshConnectionConfig, Tool};

use crate::borg::BorgAdapter;
use crate::error::{ParseError, SynthesisError};
use crate::line::SynthesizedCommand;
use crate::restic::ResticAdapter;
use crate::rsync::RsyncAdapter;
use crate::stats::ParsedStats;

/// A sub-operation of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolOperation<'a> {
    /// Create a new backup of the job's sources.
    Backup,
    /// Apply the job's retention policy.
    Prune,
    /// List the snapshots held by the destination.
    ListSnapshots,
    /// List the files of one snapshot.
    ListFiles {
        /// Snapshot to inspect.
        snapshot_id: &'a str,
    },
    /// Restore one snapshot into a directory on the SSH host.
    Restore {
        /// Snapshot to restore.
        snapshot_id: &'a str,
        /// Target directory.
        target: &'a str,
    },
}

impl ToolOperation<'_> {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Prune => "prune",
            Self::ListSnapshots => "list snapshots",
            Self::ListFiles { .. } => "list files",
            Self::Restore { .. } => "restore",
        }
    }
}

/// The inputs a command is synthesized from.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    /// The job.
    pub job: &'a BackupJobConfig,
    /// The SSH host the job targets.
    pub ssh: &'a SshConnectionConfig,
}

impl<'a> Invocation<'a> {
    /// Bundles a job and its SSH host.
    #[must_use]
    pub const fn new(job: &'a BackupJobConfig, ssh: &'a SshConnectionConfig) -> Self {
        Self { job, ssh }
    }
}

/// Command synthesis and output parsing for one backup tool.
pub trait ToolAdapter: Send + Sync {
    /// The tool this adapter drives.
    fn tool(&self) -> Tool;

    /// Builds the command for `operation`.
    ///
    /// Returns `Ok(None)` when the operation is a no-op for this job, such as a
    /// prune with an all-zero retention policy.
    fn synthesize(
        &self,
        operation: &ToolOperation<'_>,
        invocation: &Invocation<'_>,
    ) -> Result<Option<SynthesizedCommand>, SynthesisError>;

    /// Extracts byte and file counts from the backup command's stdout.
    fn parse_result(&self, stdout: &str) -> ParsedStats;

    /// Parses the output of the snapshot listing command.
    fn parse_snapshot_list(
        &self,
        output: &str,
        invocation: &Invocation<'_>,
    ) -> Result<Vec<Snapshot>, ParseError>;

    /// Parses the output of the file listing command.
    fn parse_file_list(&self, output: &str) -> Result<Vec<FileEntry>, ParseError>;

    /// Reports whether a failed command failed because the snapshot id is unknown.
    fn reports_unknown_snapshot(&self, result: &CommandResult) -> bool;
}

/// Selects the [`ToolAdapter`] of a [`Tool`].
pub trait ToolAdapterExt {
    /// Returns the adapter driving this tool.
    fn adapter(self) -> &'static dyn ToolAdapter;
}

impl ToolAdapterExt for Tool {
    fn adapter(self) -> &'static dyn ToolAdapter {
        match self {
            Self::Rsync => &RsyncAdapter,
            Self::Borg => &BorgAdapter,
            Self::Restic => &ResticAdapter,
        }
    }
}

/// Validates the job for `operation` before any synthesis.
pub(crate) fn validate(
    operation: &ToolOperation<'_>,
    job: &BackupJobConfig,
) -> Result<(), SynthesisError> {
    match operation {
        ToolOperation::Backup => job.validate_for_backup()?,
        _ => job.validate()?,
    }
    Ok(())
}
