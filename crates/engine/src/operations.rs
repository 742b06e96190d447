//! Backup, restore, and listing on top of a connected [`BackupExecutor`].
//!
//! These functions assume the executor is already connected; the runners in
//! [`crate::runner`] handle the session around them.

use command::{Invocation, SynthesisError, ToolAdapter, ToolAdapterExt, ToolOperation};
use logging::trace_engine;
use model::{
    BackupJobConfig, BackupResult, CommandResult, FileEntry, LogKind, RestoreJobConfig, Snapshot,
    SshConnectionConfig,
};

use crate::error::{EngineError, EngineResult};
use crate::executor::BackupExecutor;

/// Lines of tool output kept in an error message.
const FAILURE_TAIL_LINES: usize = 20;

/// Runs the job's backup command, then prunes borg/restic repositories.
///
/// Exit status zero marks success. A failed prune only adds a warning.
pub async fn execute_backup(
    executor: &mut BackupExecutor,
    job: &BackupJobConfig,
    ssh: &SshConnectionConfig,
) -> BackupResult {
    let mut result = BackupResult::started();
    executor.protect(job.secrets());
    let adapter = job.tool.adapter();
    let invocation = Invocation::new(job, ssh);
    trace_engine!(job = %job.job_id, tool = %job.tool, pull = job.is_pull_mode(), "backup started");
    executor
        .log(
            LogKind::Info,
            format!("Starting {} backup of job {}", job.tool, job.job_name),
        )
        .await;

    let command = match adapter.synthesize(&ToolOperation::Backup, &invocation) {
        Ok(Some(command)) => command,
        Ok(None) => {
            record_error(executor, &mut result, "Backup produced no command".to_owned()).await;
            result.finish(executor.logs().to_vec());
            return result;
        }
        Err(err) => {
            record_error(executor, &mut result, format!("Cannot build backup command: {err}"))
                .await;
            result.finish(executor.logs().to_vec());
            return result;
        }
    };

    let outcome = executor.run(command).await;
    if outcome.succeeded() {
        let stats = adapter.parse_result(&outcome.stdout);
        result.success = true;
        result.bytes_processed = stats.bytes_processed;
        result.files_processed = stats.files_processed;
        let summary = match (stats.files_processed, stats.bytes_processed) {
            (Some(files), Some(bytes)) => format!(" ({files} files, {bytes} bytes)"),
            _ => String::new(),
        };
        executor
            .log(LogKind::Success, format!("Backup completed{summary}"))
            .await;
        if job.tool.uses_repository() {
            prune(executor, &mut result, adapter, &invocation).await;
        }
    } else {
        record_error(executor, &mut result, failure_message("Backup", &outcome)).await;
    }

    trace_engine!(job = %job.job_id, success = result.success, warnings = result.warnings.len(), "backup finished");
    result.finish(executor.logs().to_vec());
    result
}

async fn prune(
    executor: &mut BackupExecutor,
    result: &mut BackupResult,
    adapter: &dyn ToolAdapter,
    invocation: &Invocation<'_>,
) {
    match adapter.synthesize(&ToolOperation::Prune, invocation) {
        Ok(None) => {
            executor
                .log(LogKind::Info, "Retention policy keeps every snapshot; prune skipped")
                .await;
        }
        Ok(Some(command)) => {
            executor
                .log(LogKind::Info, "Applying retention policy")
                .await;
            let outcome = executor.run(command).await;
            if outcome.succeeded() {
                executor.log(LogKind::Success, "Prune completed").await;
            } else {
                record_warning(executor, result, failure_message("Prune", &outcome)).await;
            }
        }
        Err(err) => {
            record_warning(executor, result, format!("Prune skipped: {err}")).await;
        }
    }
}

/// Restores one snapshot into `restore.restore_path`.
///
/// Any non-zero exit fails the restore with the tool's output in `errors`.
pub async fn restore(
    executor: &mut BackupExecutor,
    restore: &RestoreJobConfig,
    ssh: &SshConnectionConfig,
) -> BackupResult {
    let mut result = BackupResult::started();
    let job = &restore.job;
    executor.protect(job.secrets());
    trace_engine!(job = %job.job_id, snapshot = %restore.snapshot_id, "restore started");

    if let Err(err) = restore.validate() {
        record_error(executor, &mut result, format!("Invalid restore request: {err}")).await;
        result.finish(executor.logs().to_vec());
        return result;
    }
    executor
        .log(
            LogKind::Info,
            format!(
                "Restoring snapshot {} to {}",
                restore.snapshot_id, restore.restore_path
            ),
        )
        .await;

    let operation = ToolOperation::Restore {
        snapshot_id: restore.snapshot_id.trim(),
        target: restore.restore_path.trim(),
    };
    match job.tool.adapter().synthesize(&operation, &Invocation::new(job, ssh)) {
        Ok(Some(command)) => {
            let outcome = executor.run(command).await;
            if outcome.succeeded() {
                result.success = true;
                executor.log(LogKind::Success, "Restore completed").await;
            } else {
                record_error(executor, &mut result, failure_message("Restore", &outcome)).await;
            }
        }
        Ok(None) => {
            record_error(executor, &mut result, "Restore produced no command".to_owned()).await;
        }
        Err(err) => {
            record_error(executor, &mut result, format!("Cannot build restore command: {err}"))
                .await;
        }
    }

    trace_engine!(job = %job.job_id, success = result.success, "restore finished");
    result.finish(executor.logs().to_vec());
    result
}

/// Lists the snapshots held by the job's destination.
pub async fn list_snapshots(
    executor: &mut BackupExecutor,
    job: &BackupJobConfig,
    ssh: &SshConnectionConfig,
) -> EngineResult<Vec<Snapshot>> {
    const OPERATION: &str = "list snapshots";
    executor.protect(job.secrets());
    let adapter = job.tool.adapter();
    let invocation = Invocation::new(job, ssh);
    let Some(command) = adapter.synthesize(&ToolOperation::ListSnapshots, &invocation)? else {
        return Ok(Vec::new());
    };

    let outcome = executor.run(command).await;
    if outcome.interrupted() {
        return Err(interrupted(executor, OPERATION, &outcome).await);
    }
    if !outcome.succeeded() {
        let output = executor.redact(tail(outcome.failure_output()));
        executor
            .log(LogKind::Error, format!("Listing snapshots failed: {output}"))
            .await;
        return Err(EngineError::ListFailed { output });
    }

    let snapshots = adapter
        .parse_snapshot_list(&outcome.stdout, &invocation)
        .map_err(|source| EngineError::Parse {
            operation: OPERATION,
            source,
        })?;
    executor
        .log(LogKind::Info, format!("Found {} snapshots", snapshots.len()))
        .await;
    Ok(snapshots)
}

/// Lists the files of one snapshot.
pub async fn list_files(
    executor: &mut BackupExecutor,
    job: &BackupJobConfig,
    ssh: &SshConnectionConfig,
    snapshot_id: &str,
) -> EngineResult<Vec<FileEntry>> {
    const OPERATION: &str = "list files";
    executor.protect(job.secrets());
    let snapshot_id = snapshot_id.trim();
    let adapter = job.tool.adapter();
    let invocation = Invocation::new(job, ssh);
    let command = match adapter.synthesize(&ToolOperation::ListFiles { snapshot_id }, &invocation) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(Vec::new()),
        Err(SynthesisError::SnapshotNotFound { id }) => {
            return Err(EngineError::SnapshotNotFound { id });
        }
        Err(err) => return Err(err.into()),
    };

    let outcome = executor.run(command).await;
    if outcome.interrupted() {
        return Err(interrupted(executor, OPERATION, &outcome).await);
    }
    if let Some(status) = outcome.exit_code.filter(|status| *status != 0) {
        if adapter.reports_unknown_snapshot(&outcome) {
            executor
                .log(LogKind::Error, format!("Snapshot {snapshot_id} not found"))
                .await;
            return Err(EngineError::SnapshotNotFound {
                id: snapshot_id.to_owned(),
            });
        }
        let output = executor.redact(tail(outcome.failure_output()));
        executor
            .log(LogKind::Error, format!("Listing files failed: {output}"))
            .await;
        return Err(EngineError::CommandExecutionFailed {
            operation: OPERATION,
            status,
            output,
        });
    }

    let entries = adapter
        .parse_file_list(&outcome.stdout)
        .map_err(|source| EngineError::Parse {
            operation: OPERATION,
            source,
        })?;
    executor
        .log(
            LogKind::Info,
            format!("Snapshot {snapshot_id} holds {} entries", entries.len()),
        )
        .await;
    Ok(entries)
}

async fn record_error(executor: &mut BackupExecutor, result: &mut BackupResult, message: String) {
    let message = executor.redact(&message);
    executor.log(LogKind::Error, &message).await;
    result.errors.push(message);
}

async fn record_warning(executor: &mut BackupExecutor, result: &mut BackupResult, message: String) {
    let message = executor.redact(&message);
    executor.log(LogKind::Error, &message).await;
    result.warnings.push(message);
}

async fn interrupted(
    executor: &mut BackupExecutor,
    operation: &'static str,
    outcome: &CommandResult,
) -> EngineError {
    EngineError::Interrupted {
        operation,
        reason: executor.redact(tail(outcome.failure_output())),
    }
}

fn failure_message(step: &str, outcome: &CommandResult) -> String {
    let output = tail(outcome.failure_output());
    match (outcome.exit_code, output.is_empty()) {
        (Some(code), true) => format!("{step} failed with exit code {code}"),
        (Some(code), false) => format!("{step} failed with exit code {code}: {output}"),
        (None, true) => format!("{step} interrupted"),
        (None, false) => format!("{step} interrupted: {output}"),
    }
}

/// The last [`FAILURE_TAIL_LINES`] lines of `output`.
fn tail(output: &str) -> &str {
    output
        .char_indices()
        .rev()
        .filter(|(_, ch)| *ch == '\n')
        .nth(FAILURE_TAIL_LINES - 1)
        .map_or(output, |(index, _)| &output[index + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let long: String = (1..=30).map(|n| format!("line {n}\n")).collect();
        let kept = tail(long.trim_end());
        assert!(kept.starts_with("line 11"));
        assert_eq!(kept.lines().count(), 20);
        assert_eq!(tail("short"), "short");
    }

    #[test]
    fn failure_messages_name_the_status() {
        let failed = CommandResult {
            stdout: String::new(),
            stderr: "rsync error: some files could not be transferred (code 23)\n".to_owned(),
            exit_code: Some(23),
        };
        assert_eq!(
            failure_message("Backup", &failed),
            "Backup failed with exit code 23: rsync error: some files could not be transferred (code 23)"
        );
        let silent = CommandResult {
            exit_code: None,
            ..CommandResult::default()
        };
        assert_eq!(failure_message("Prune", &silent), "Prune interrupted");
    }
}
