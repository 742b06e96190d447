//! rsync mirror adapter.
//!
//! rsync keeps a single mirror at the destination, so the destination is
//! reported as one pseudo-snapshot named [`RSYNC_MIRROR_SNAPSHOT`]. Listings
//! use `rsync --list-only`, which works the same for local and remote paths.
//!
//! Push mode runs rsync on the SSH host. Pull mode (NFS destination) runs
//! rsync locally and reaches the host through the `-e` transport built by
//! [`RemoteShell`].

use model::{
    CommandResult, EntryKind, FileEntry, SshAuth, Snapshot, SshConnectionConfig, Tool,
};

use crate::adapter::{Invocation, ToolAdapter, ToolOperation, validate};
use crate::error::{ParseError, SynthesisError};
use crate::line::{CommandLine, Environment, SynthesizedCommand};
use crate::remote_shell::{RemoteShell, remote_spec};
use crate::stats::{ParsedStats, labelled_value, leading_number};

/// Pseudo-filesystems and mount roots rsync must never descend into.
pub const RSYNC_SYSTEM_EXCLUDES: [&str; 7] =
    ["/mnt", "/media", "/run/media", "/run", "/proc", "/sys", "/dev"];

/// Identifier of the mirror pseudo-snapshot.
pub const RSYNC_MIRROR_SNAPSHOT: &str = "latest";

const TRANSFER_FLAGS: [&str; 3] = ["-avz", "--stats", "--progress"];

pub(crate) struct RsyncAdapter;

impl ToolAdapter for RsyncAdapter {
    fn tool(&self) -> Tool {
        Tool::Rsync
    }

    fn synthesize(
        &self,
        operation: &ToolOperation<'_>,
        invocation: &Invocation<'_>,
    ) -> Result<Option<SynthesizedCommand>, SynthesisError> {
        validate(operation, invocation.job)?;
        let job = invocation.job;
        let pull = job.is_pull_mode();
        let destination = job.destination_path.trim();

        let command = match *operation {
            ToolOperation::Backup => {
                let sources: Vec<String> = job
                    .source_paths
                    .iter()
                    .map(String::as_str)
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(|path| {
                        if pull {
                            remote_spec(invocation.ssh, path)
                        } else {
                            path.to_owned()
                        }
                    })
                    .collect();
                transfer(invocation.ssh, pull, sources, destination.to_owned())
            }
            ToolOperation::Prune => return Ok(None),
            ToolOperation::ListSnapshots => listing(pull, destination, false),
            ToolOperation::ListFiles { snapshot_id } => {
                require_mirror(snapshot_id)?;
                listing(pull, destination, true)
            }
            ToolOperation::Restore {
                snapshot_id,
                target,
            } => {
                require_mirror(snapshot_id)?;
                let target = with_trailing_slash(target.trim());
                let target = if pull {
                    remote_spec(invocation.ssh, &target)
                } else {
                    target
                };
                transfer(
                    invocation.ssh,
                    pull,
                    vec![with_trailing_slash(destination)],
                    target,
                )
            }
        };
        Ok(Some(command))
    }

    fn parse_result(&self, stdout: &str) -> ParsedStats {
        let files = labelled_value(stdout, "Number of regular files transferred")
            .or_else(|| labelled_value(stdout, "Number of files transferred"))
            .and_then(leading_number);
        let bytes =
            labelled_value(stdout, "Total transferred file size").and_then(leading_number);
        ParsedStats {
            bytes_processed: bytes,
            files_processed: files,
        }
    }

    fn parse_snapshot_list(
        &self,
        output: &str,
        invocation: &Invocation<'_>,
    ) -> Result<Vec<Snapshot>, ParseError> {
        let root = list_only_entries(output)?
            .into_iter()
            .find(|entry| entry.path == ".");
        Ok(root
            .map(|entry| Snapshot {
                id: RSYNC_MIRROR_SNAPSHOT.to_owned(),
                short_id: Snapshot::short_id_of(RSYNC_MIRROR_SNAPSHOT),
                time: entry.modified.unwrap_or_default(),
                paths: invocation.job.source_paths.clone(),
                hostname: invocation.ssh.host().to_owned(),
                username: Some(invocation.ssh.username().to_owned()),
                tags: std::iter::once("mirror".to_owned()).collect(),
            })
            .into_iter()
            .collect())
    }

    fn parse_file_list(&self, output: &str) -> Result<Vec<FileEntry>, ParseError> {
        Ok(list_only_entries(output)?
            .into_iter()
            .filter(|entry| entry.path != ".")
            .map(|mut entry| {
                entry.path = format!("/{}", entry.path.trim_start_matches("./"));
                entry
            })
            .collect())
    }

    fn reports_unknown_snapshot(&self, _result: &CommandResult) -> bool {
        false
    }
}

/// The mandatory rsync flags shared by every invocation.
fn rsync_base(flags: &[&str]) -> CommandLine {
    CommandLine::new("rsync")
        .args(flags.iter().copied())
        .arg("--one-file-system")
        .args(RSYNC_SYSTEM_EXCLUDES.iter().map(|path| format!("--exclude={path}")))
}

fn transfer(
    ssh: &SshConnectionConfig,
    pull: bool,
    sources: Vec<String>,
    destination: String,
) -> SynthesizedCommand {
    let line = rsync_base(&TRANSFER_FLAGS);
    if !pull {
        return SynthesizedCommand::remote(line.args(sources).arg(destination));
    }

    let line = line
        .arg("-e")
        .arg(RemoteShell::for_session(ssh).render())
        .args(sources)
        .arg(destination);
    match ssh.auth() {
        SshAuth::PrivateKey { .. } => SynthesizedCommand::local(line),
        SshAuth::Password(password) => {
            let mut env = Environment::new();
            env.set("SSHPASS", password.clone());
            let wrapped = CommandLine::new("sshpass")
                .arg("-e")
                .arg(line.program())
                .args(line.arguments().iter().cloned());
            SynthesizedCommand::local(wrapped).with_env(env)
        }
    }
}

fn listing(pull: bool, destination: &str, recursive: bool) -> SynthesizedCommand {
    let flags: &[&str] = if recursive {
        &["-r", "--list-only"]
    } else {
        &["--list-only"]
    };
    let line = rsync_base(flags).arg(with_trailing_slash(destination));
    if pull {
        SynthesizedCommand::local(line)
    } else {
        SynthesizedCommand::remote(line)
    }
}

fn require_mirror(snapshot_id: &str) -> Result<(), SynthesisError> {
    if snapshot_id == RSYNC_MIRROR_SNAPSHOT {
        Ok(())
    } else {
        Err(SynthesisError::SnapshotNotFound {
            id: snapshot_id.to_owned(),
        })
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_owned()
    } else {
        format!("{path}/")
    }
}

/// Parses `rsync --list-only` lines: `perms size date time name`.
fn list_only_entries(output: &str) -> Result<Vec<FileEntry>, ParseError> {
    let mut entries = Vec::new();
    for (index, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut rest = line.trim_start();
        let mut fields = [""; 4];
        for field in &mut fields {
            let end = rest.find(char::is_whitespace).ok_or(ParseError::Unexpected {
                tool: Tool::Rsync,
                line: index + 1,
            })?;
            *field = &rest[..end];
            rest = rest[end..].trim_start();
        }
        let [mode, size, date, time] = fields;
        let kind = match mode.chars().next() {
            Some('-') => EntryKind::File,
            Some('d') => EntryKind::Dir,
            Some('l') => EntryKind::Symlink,
            _ => EntryKind::Other,
        };
        let name = if kind == EntryKind::Symlink {
            rest.split_once(" -> ").map_or(rest, |(name, _)| name)
        } else {
            rest
        };
        entries.push(FileEntry {
            path: name.to_owned(),
            kind,
            size: leading_number(size),
            modified: Some(format!("{}T{time}", date.replace('/', "-"))),
        });
    }
    Ok(entries)
}
