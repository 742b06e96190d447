use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::secret::Secret;

/// External backup tool driven by a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// BorgBackup.
    Borg,
    /// restic.
    Restic,
    /// rsync mirror.
    Rsync,
}

impl Tool {
    /// Returns the binary name, which doubles as the wire identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Borg => "borg",
            Self::Restic => "restic",
            Self::Rsync => "rsync",
        }
    }

    /// Reports whether the tool writes into an encrypted repository.
    #[must_use]
    pub const fn uses_repository(self) -> bool {
        matches!(self, Self::Borg | Self::Restic)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "borg" => Ok(Self::Borg),
            "restic" => Ok(Self::Restic),
            "rsync" => Ok(Self::Rsync),
            other => Err(ModelError::UnknownTool(other.to_owned())),
        }
    }
}

/// Kind of storage the job writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    /// S3-compatible object storage.
    S3,
    /// Remote host reachable over SFTP/SSH.
    Sftp,
    /// Filesystem local to the controlling machine (NFS mount).
    Nfs,
    /// Backblaze B2.
    B2,
    /// Google Cloud Storage.
    Gcs,
    /// Azure Blob Storage.
    Azure,
    /// Google Drive (through rclone).
    Gdrive,
    /// Microsoft OneDrive (through rclone).
    Onedrive,
}

impl DestinationType {
    /// Returns the wire identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Sftp => "sftp",
            Self::Nfs => "nfs",
            Self::B2 => "b2",
            Self::Gcs => "gcs",
            Self::Azure => "azure",
            Self::Gdrive => "gdrive",
            Self::Onedrive => "onedrive",
        }
    }
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DestinationType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "sftp" => Ok(Self::Sftp),
            "nfs" => Ok(Self::Nfs),
            "b2" => Ok(Self::B2),
            "gcs" => Ok(Self::Gcs),
            "azure" => Ok(Self::Azure),
            "gdrive" => Ok(Self::Gdrive),
            "onedrive" => Ok(Self::Onedrive),
            other => Err(ModelError::UnknownDestination(other.to_owned())),
        }
    }
}

/// Which side initiates the data transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// The remote host pushes toward the destination; commands run over SSH.
    Push,
    /// The controlling machine pulls from the remote host into local storage.
    Pull,
}

/// Access parameters of the destination storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DestinationCredentials {
    /// Service endpoint (S3-compatible host, rclone remote name, ...).
    pub endpoint: Option<String>,
    /// Region identifier.
    pub region: Option<String>,
    /// Access key id / account name.
    pub access_key: Option<Secret>,
    /// Secret key / account key.
    pub secret_key: Option<Secret>,
}

impl DestinationCredentials {
    /// Iterates over the secret fields that are present.
    pub fn secrets(&self) -> impl Iterator<Item = &Secret> {
        self.access_key.iter().chain(self.secret_key.iter())
    }
}

/// How many snapshots of each granularity survive a prune.
///
/// A zero field keeps none of that granularity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionPolicy {
    /// Hourly snapshots to keep.
    pub keep_hourly: u32,
    /// Daily snapshots to keep.
    pub keep_daily: u32,
    /// Weekly snapshots to keep.
    pub keep_weekly: u32,
    /// Monthly snapshots to keep.
    pub keep_monthly: u32,
    /// Yearly snapshots to keep.
    pub keep_yearly: u32,
}

impl RetentionPolicy {
    /// Returns `(flag suffix, count)` pairs for every granularity, hourly first.
    #[must_use]
    pub const fn rules(&self) -> [(&'static str, u32); 5] {
        [
            ("hourly", self.keep_hourly),
            ("daily", self.keep_daily),
            ("weekly", self.keep_weekly),
            ("monthly", self.keep_monthly),
            ("yearly", self.keep_yearly),
        ]
    }

    /// Reports whether no granularity keeps anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules().iter().all(|(_, count)| *count == 0)
    }
}

/// Everything needed to run one backup job invocation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupJobConfig {
    /// Persistent job identifier.
    pub job_id: String,
    /// Human-readable job name.
    pub job_name: String,
    /// Tool performing the backup.
    pub tool: Tool,
    /// Paths on the remote host, in the order given by the operator.
    pub source_paths: Vec<String>,
    /// Destination storage kind.
    pub destination_type: DestinationType,
    /// Bucket/path, remote spec, or local directory depending on `destination_type`.
    pub destination_path: String,
    /// Destination access parameters.
    #[serde(default)]
    pub credentials: DestinationCredentials,
    /// Repository encryption password (borg/restic only).
    #[serde(default)]
    pub repo_password: Option<Secret>,
    /// Prune policy applied after successful borg/restic backups.
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl BackupJobConfig {
    /// Checks the structural invariants of the job.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.destination_path.trim().is_empty() {
            return Err(ModelError::MissingField("destinationPath"));
        }
        if self.tool.uses_repository()
            && self.repo_password.as_ref().is_none_or(Secret::is_empty)
        {
            return Err(ModelError::MissingRepoPassword {
                tool: self.tool.name(),
            });
        }
        Ok(())
    }

    /// Checks [`validate`](Self::validate) plus the presence of source paths.
    pub fn validate_for_backup(&self) -> Result<(), ModelError> {
        self.validate()?;
        if self.source_paths.iter().all(|path| path.trim().is_empty()) {
            return Err(ModelError::EmptySources);
        }
        Ok(())
    }

    /// rsync into an NFS destination pulls; everything else pushes.
    #[must_use]
    pub fn transfer_mode(&self) -> TransferMode {
        if self.tool == Tool::Rsync && self.destination_type == DestinationType::Nfs {
            TransferMode::Pull
        } else {
            TransferMode::Push
        }
    }

    /// Reports whether the job runs in pull mode.
    #[must_use]
    pub fn is_pull_mode(&self) -> bool {
        self.transfer_mode() == TransferMode::Pull
    }

    /// Iterates over every secret the job carries.
    pub fn secrets(&self) -> impl Iterator<Item = &Secret> {
        self.repo_password.iter().chain(self.credentials.secrets())
    }
}

/// A backup job plus the snapshot to restore and where to put it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreJobConfig {
    /// Job whose repository holds the snapshot.
    #[serde(flatten)]
    pub job: BackupJobConfig,
    /// Snapshot (or archive) identifier.
    pub snapshot_id: String,
    /// Target directory of the restore.
    pub restore_path: String,
}

impl RestoreJobConfig {
    /// Checks the job invariants and the restore-specific fields.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.job.validate()?;
        if self.snapshot_id.trim().is_empty() {
            return Err(ModelError::MissingField("snapshotId"));
        }
        if self.restore_path.trim().is_empty() {
            return Err(ModelError::MissingField("restorePath"));
        }
        Ok(())
    }
}
