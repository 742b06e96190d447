//! restic adapter.
//!
//! restic writes newline-delimited JSON with `--json`: backups stream status
//! objects followed by one `summary`, and `ls` prints the snapshot header
//! before one object per node.

use model::{CommandResult, EntryKind, FileEntry, Snapshot, Tool};
use serde::Deserialize;

use crate::adapter::{Invocation, ToolAdapter, ToolOperation, validate};
use crate::error::{ParseError, SynthesisError};
use crate::line::{CommandLine, SynthesizedCommand};
use crate::stats::ParsedStats;
use crate::target::repository_environment;

const UNKNOWN_SNAPSHOT_MARKERS: [&str; 3] = [
    "no matching ID found",
    "failed to find snapshot",
    "invalid id",
];

pub(crate) struct ResticAdapter;

impl ToolAdapter for ResticAdapter {
    fn tool(&self) -> Tool {
        Tool::Restic
    }

    fn synthesize(
        &self,
        operation: &ToolOperation<'_>,
        invocation: &Invocation<'_>,
    ) -> Result<Option<SynthesizedCommand>, SynthesisError> {
        validate(operation, invocation.job)?;
        let job = invocation.job;
        let env = repository_environment(job)?;

        let line = match *operation {
            ToolOperation::Backup => CommandLine::new("restic")
                .args(["backup", "--json", "--one-file-system"])
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
                CommandLine::new("restic").args(["forget", "--prune"]).args(
                    job.retention
                        .rules()
                        .into_iter()
                        .filter(|(_, count)| *count > 0)
                        .map(|(name, count)| format!("--keep-{name}={count}")),
                )
            }
            ToolOperation::ListSnapshots => {
                CommandLine::new("restic").args(["snapshots", "--json"])
            }
            ToolOperation::ListFiles { snapshot_id } => CommandLine::new("restic")
                .args(["ls", "--json"])
                .arg(snapshot_id),
            ToolOperation::Restore {
                snapshot_id,
                target,
            } => CommandLine::new("restic")
                .arg("restore")
                .arg(snapshot_id)
                .arg("--target")
                .arg(target.trim()),
        };
        Ok(Some(SynthesizedCommand::remote(line).with_env(env)))
    }

    fn parse_result(&self, stdout: &str) -> ParsedStats {
        stdout
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str::<ResticMessage>(line.trim()).ok())
            .find(|message| message.message_type.as_deref() == Some("summary"))
            .map(|summary| ParsedStats {
                bytes_processed: summary.total_bytes_processed,
                files_processed: summary.total_files_processed,
            })
            .unwrap_or_default()
    }

    fn parse_snapshot_list(
        &self,
        output: &str,
        _invocation: &Invocation<'_>,
    ) -> Result<Vec<Snapshot>, ParseError> {
        let snapshots: Vec<ResticSnapshot> =
            serde_json::from_str(output.trim()).map_err(|source| ParseError::Json {
                tool: Tool::Restic,
                source,
            })?;
        Ok(snapshots
            .into_iter()
            .map(|snapshot| Snapshot {
                short_id: snapshot
                    .short_id
                    .unwrap_or_else(|| Snapshot::short_id_of(&snapshot.id)),
                id: snapshot.id,
                time: snapshot.time,
                paths: snapshot.paths,
                hostname: snapshot.hostname,
                username: snapshot.username,
                tags: snapshot.tags.unwrap_or_default().into_iter().collect(),
            })
            .collect())
    }

    fn parse_file_list(&self, output: &str) -> Result<Vec<FileEntry>, ParseError> {
        let mut entries = Vec::new();
        for line in output.lines().filter(|line| !line.trim().is_empty()) {
            let node: ResticNode =
                serde_json::from_str(line).map_err(|source| ParseError::Json {
                    tool: Tool::Restic,
                    source,
                })?;
            if node.is_snapshot_header() {
                continue;
            }
            let Some(path) = node.path else {
                continue;
            };
            entries.push(FileEntry {
                path,
                kind: node
                    .kind
                    .as_deref()
                    .map_or(EntryKind::Other, EntryKind::from_marker),
                size: node.size,
                modified: node.mtime,
            });
        }
        Ok(entries)
    }

    fn reports_unknown_snapshot(&self, result: &CommandResult) -> bool {
        !result.succeeded()
            && UNKNOWN_SNAPSHOT_MARKERS
                .iter()
                .any(|marker| result.stderr.contains(marker))
    }
}

#[derive(Deserialize)]
struct ResticMessage {
    message_type: Option<String>,
    total_files_processed: Option<u64>,
    total_bytes_processed: Option<u64>,
}

#[derive(Deserialize)]
struct ResticSnapshot {
    id: String,
    short_id: Option<String>,
    time: String,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    hostname: String,
    username: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ResticNode {
    #[serde(rename = "type")]
    kind: Option<String>,
    path: Option<String>,
    size: Option<u64>,
    mtime: Option<String>,
    struct_type: Option<String>,
    message_type: Option<String>,
}

impl ResticNode {
    fn is_snapshot_header(&self) -> bool {
        self.struct_type.as_deref() == Some("snapshot")
            || self.message_type.as_deref() == Some("snapshot")
    }
}
