//! BorgBackup adapter.
//!
//! The repository and passphrase travel in `BORG_REPO` / `BORG_PASSPHRASE`,
//! so archives are addressed as `::name`. Archive names are derived from the
//! job name plus borg's own `{now}` placeholder, which keeps synthesis free
//! of clock reads.

use model::{CommandResult, EntryKind, FileEntry, Snapshot, Tool};
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::{Invocation, ToolAdapter, ToolOperation, validate};
use crate::error::{ParseError, SynthesisError};
use crate::line::{CommandLine, SynthesizedCommand, shell_quote};
use crate::stats::ParsedStats;
use crate::target::repository_environment;

const ARCHIVE_TIME_SUFFIX: &str = "{now:%Y-%m-%dT%H:%M:%S}";

pub(crate) struct BorgAdapter;

impl ToolAdapter for BorgAdapter {
    fn tool(&self) -> Tool {
        Tool::Borg
    }

    fn synthesize(
        &self,
        operation: &ToolOperation<'_>,
        invocation: &Invocation<'_>,
    ) -> Result<Option<SynthesizedCommand>, SynthesisError> {
        validate(operation, invocation.job)?;
        let job = invocation.job;
        let env = repository_environment(job)?;
        let prefix = archive_prefix(&job.job_name, &job.job_id);

        let line = match *operation {
            ToolOperation::Backup => CommandLine::new("borg")
                .args(["create", "--json", "--one-file-system", "--exclude-caches"])
                .arg(format!("::{prefix}-{ARCHIVE_TIME_SUFFIX}"))
                .args(
                    job.source_paths
                        .iter()
                        .map(String::as_str)
                        .map(str::trim)
                        .filter(|path| !path.is_empty()),
                ),
            ToolOperation::Prune => {
                if job.retention.is_empty() {
                    return Ok(None);
                }
                CommandLine::new("borg")
                    .args(["prune", "--list"])
                    .arg(format!("--glob-archives={prefix}-*"))
                    .args(
                        job.retention
                            .rules()
                            .into_iter()
                            .filter(|(_, count)| *count > 0)
                            .map(|(name, count)| format!("--keep-{name}={count}")),
                    )
            }
            ToolOperation::ListSnapshots => CommandLine::new("borg").args(["list", "--json"]),
            ToolOperation::ListFiles { snapshot_id } => CommandLine::new("borg")
                .args(["list", "--json-lines"])
                .arg(format!("::{snapshot_id}")),
            ToolOperation::Restore {
                snapshot_id,
                target,
            } => {
                let target = shell_quote(target.trim());
                let archive = shell_quote(&format!("::{snapshot_id}"));
                CommandLine::new("sh").arg("-c").arg(format!(
                    "mkdir -p {target} && cd {target} && exec borg extract --list {archive}"
                ))
            }
        };
        Ok(Some(SynthesizedCommand::remote(line).with_env(env)))
    }

    fn parse_result(&self, stdout: &str) -> ParsedStats {
        let Some(start) = stdout.find('{') else {
            return ParsedStats::default();
        };
        let Some(Ok(value)) = serde_json::Deserializer::from_str(&stdout[start..])
            .into_iter::<Value>()
            .next()
        else {
            return ParsedStats::default();
        };
        ParsedStats {
            bytes_processed: value
                .pointer("/archive/stats/original_size")
                .and_then(Value::as_u64),
            files_processed: value
                .pointer("/archive/stats/nfiles")
                .and_then(Value::as_u64),
        }
    }

    fn parse_snapshot_list(
        &self,
        output: &str,
        invocation: &Invocation<'_>,
    ) -> Result<Vec<Snapshot>, ParseError> {
        let listing: BorgListing =
            serde_json::from_str(output).map_err(|source| ParseError::Json {
                tool: Tool::Borg,
                source,
            })?;
        Ok(listing
            .archives
            .into_iter()
            .map(|archive| Snapshot {
                // Archive names are borg's unique handle; a fixed-length
                // prefix collides across archives of one job.
                short_id: archive.name.clone(),
                time: archive.time.or(archive.start).unwrap_or_default(),
                paths: invocation.job.source_paths.clone(),
                hostname: archive
                    .hostname
                    .unwrap_or_else(|| invocation.ssh.host().to_owned()),
                username: archive.username,
                tags: archive.tags.into_iter().collect(),
                id: archive.name,
            })
            .collect())
    }

    fn parse_file_list(&self, output: &str) -> Result<Vec<FileEntry>, ParseError> {
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let item: BorgItem =
                    serde_json::from_str(line).map_err(|source| ParseError::Json {
                        tool: Tool::Borg,
                        source,
                    })?;
                Ok(FileEntry {
                    path: format!("/{}", item.path.trim_start_matches('/')),
                    kind: EntryKind::from_marker(&item.kind),
                    size: item.size,
                    modified: item.mtime,
                })
            })
            .collect()
    }

    fn reports_unknown_snapshot(&self, result: &CommandResult) -> bool {
        !result.succeeded()
            && result.stderr.contains("Archive")
            && result.stderr.contains("does not exist")
    }
}

#[derive(Deserialize)]
struct BorgListing {
    #[serde(default)]
    archives: Vec<BorgArchive>,
}

#[derive(Deserialize)]
struct BorgArchive {
    name: String,
    time: Option<String>,
    start: Option<String>,
    hostname: Option<String>,
    username: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct BorgItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    size: Option<u64>,
    mtime: Option<String>,
}

/// Lowercase job-name slug used as the archive prefix; falls back to the job id.
fn archive_prefix(job_name: &str, job_id: &str) -> String {
    let mut slug = String::with_capacity(job_name.len());
    for ch in job_name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("job-{job_id}")
    } else {
        slug.to_owned()
    }
}
