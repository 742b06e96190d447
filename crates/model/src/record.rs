//! Conversion between persisted job rows and the typed API shape.
//!
//! The persistence layer stores list and object columns as JSON text; the
//! invocation API works with typed fields. Both directions live here so the
//! round trip stays lossless.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::job::{BackupJobConfig, DestinationCredentials, DestinationType, RetentionPolicy, Tool};
use crate::secret::Secret;

/// Aggregate statistics of the last run, stored alongside the job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStats {
    /// Bytes processed by the last run.
    pub bytes_processed: Option<u64>,
    /// Files processed by the last run.
    pub files_processed: Option<u64>,
    /// Wall-clock duration of the last run.
    pub duration_seconds: Option<u64>,
}

/// A job as exposed through the API, with typed list and object fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    /// Row identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// System (SSH host) the job runs against.
    pub system_id: Option<i64>,
    /// Storage location the job writes to.
    pub location_id: Option<i64>,
    /// Backup tool.
    pub tool: Tool,
    /// Ordered source paths.
    pub source_paths: Vec<String>,
    /// Cron expression evaluated by the external scheduler.
    pub schedule: Option<String>,
    /// Prune policy.
    pub retention: RetentionPolicy,
    /// Whether the scheduler should run the job.
    pub enabled: bool,
    /// RFC 3339 time of the last run.
    pub last_run: Option<String>,
    /// Outcome label of the last run.
    pub last_status: Option<String>,
    /// Statistics of the last run.
    pub stats: Option<JobStats>,
}

/// A job as stored by the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Row identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Foreign key of the system.
    pub system_id: Option<i64>,
    /// Foreign key of the location.
    pub location_id: Option<i64>,
    /// Tool identifier.
    pub tool: String,
    /// JSON array of source paths.
    pub source_paths: String,
    /// Cron expression.
    pub schedule: Option<String>,
    /// JSON object of the retention policy.
    pub retention: String,
    /// `1` when enabled, `0` otherwise.
    pub enabled: i64,
    /// RFC 3339 time of the last run.
    pub last_run: Option<String>,
    /// Outcome label of the last run.
    pub last_status: Option<String>,
    /// JSON object of the last-run statistics.
    pub stats: Option<String>,
}

/// Destination half of a job, supplied by the location store.
#[derive(Clone, Debug, Default)]
pub struct LocationBinding {
    /// Destination kind.
    pub destination_type: Option<DestinationType>,
    /// Bucket/path, remote spec, or local directory.
    pub destination_path: String,
    /// Destination access parameters.
    pub credentials: DestinationCredentials,
}

impl JobDefinition {
    /// Encodes the definition into its persisted form.
    pub fn to_record(&self) -> Result<JobRecord, ModelError> {
        Ok(JobRecord {
            id: self.id,
            name: self.name.clone(),
            system_id: self.system_id,
            location_id: self.location_id,
            tool: self.tool.name().to_owned(),
            source_paths: encode("source_paths", &self.source_paths)?,
            schedule: self.schedule.clone(),
            retention: encode("retention", &self.retention)?,
            enabled: i64::from(self.enabled),
            last_run: self.last_run.clone(),
            last_status: self.last_status.clone(),
            stats: self
                .stats
                .as_ref()
                .map(|stats| encode("stats", stats))
                .transpose()?,
        })
    }

    /// Builds the engine input for this job from its location and repository password.
    pub fn to_backup_config(
        &self,
        location: &LocationBinding,
        repo_password: Option<Secret>,
    ) -> Result<BackupJobConfig, ModelError> {
        let destination_type = location
            .destination_type
            .ok_or(ModelError::MissingField("destinationType"))?;
        let config = BackupJobConfig {
            job_id: self.id.to_string(),
            job_name: self.name.clone(),
            tool: self.tool,
            source_paths: self.source_paths.clone(),
            destination_type,
            destination_path: location.destination_path.clone(),
            credentials: location.credentials.clone(),
            repo_password,
            retention: self.retention,
        };
        config.validate()?;
        Ok(config)
    }
}

impl JobRecord {
    /// Decodes the persisted form into the typed definition.
    pub fn to_definition(&self) -> Result<JobDefinition, ModelError> {
        Ok(JobDefinition {
            id: self.id,
            name: self.name.clone(),
            system_id: self.system_id,
            location_id: self.location_id,
            tool: self.tool.parse()?,
            source_paths: decode("source_paths", &self.source_paths)?,
            schedule: self.schedule.clone(),
            retention: decode("retention", &self.retention)?,
            enabled: self.enabled != 0,
            last_run: self.last_run.clone(),
            last_status: self.last_status.clone(),
            stats: self
                .stats
                .as_deref()
                .map(|stats| decode("stats", stats))
                .transpose()?,
        })
    }
}

fn encode<T: Serialize>(field: &'static str, value: &T) -> Result<String, ModelError> {
    serde_json::to_string(value).map_err(|source| ModelError::RecordField { field, source })
}

fn decode<T: for<'de> Deserialize<'de>>(field: &'static str, text: &str) -> Result<T, ModelError> {
    serde_json::from_str(text).map_err(|source| ModelError::RecordField { field, source })
}
