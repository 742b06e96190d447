//! Line-content heuristics that map tool output onto transcript kinds.
//!
//! rsync, borg, and restic each print a mix of progress, statistics, and
//! diagnostics. The checks below run in a fixed order (JSON status objects,
//! errors, success markers, statistics, progress) and fall back to
//! [`LogKind::Info`].

use model::LogKind;
use serde_json::Value;

const ERROR_PREFIXES: &[&str] = &[
    "rsync error:",
    "rsync: [sender]",
    "rsync: [receiver]",
    "rsync: [generator]",
    "Fatal:",
    "fatal:",
    "Fatal error:",
    "Error:",
    "error:",
    "ERROR:",
    "ERROR ",
    "ssh:",
];

const ERROR_FRAGMENTS: &[&str] = &[
    "Permission denied",
    "No such file or directory",
    "Connection refused",
    "Connection timed out",
    "command not found",
    "wrong password",
    "Passphrase provided in BORG_PASSPHRASE",
    "failed to",
    "does not exist",
    "is not a valid repository",
];

const STATS_PREFIXES: &[&str] = &[
    // rsync --stats
    "Number of files",
    "Number of created files",
    "Number of deleted files",
    "Number of regular files transferred",
    "Total file size",
    "Total transferred file size",
    "Literal data",
    "Matched data",
    "File list size",
    "File list generation time",
    "File list transfer time",
    "Total bytes sent",
    "Total bytes received",
    "sent ",
    "total size is",
    // borg --stats
    "Archive name:",
    "Archive fingerprint:",
    "Time (start):",
    "Time (end):",
    "Duration:",
    "Number of files:",
    "Utilization of max. archive size:",
    "This archive:",
    "All archives:",
    "Unique chunks",
    "Chunk index:",
    "Original size",
    "Deduplicated size",
    // restic
    "Files:",
    "Dirs:",
    "Data Blobs:",
    "Tree Blobs:",
    "Added to the repository",
    "Added to the repo",
    "processed ",
];

/// Classifies one line of tool output.
///
/// Lines are expected without their trailing newline; surrounding whitespace
/// is ignored.
#[must_use]
pub fn classify_line(line: &str) -> LogKind {
    let line = line.trim();
    if line.starts_with('{')
        && let Some(kind) = classify_json(line)
    {
        return kind;
    }
    if is_error(line) {
        LogKind::Error
    } else if is_success(line) {
        LogKind::Success
    } else if is_stats(line) {
        LogKind::Stats
    } else if is_progress(line) {
        LogKind::Progress
    } else {
        LogKind::Info
    }
}

/// restic `--json` lines carry `message_type`; borg `--log-json` lines carry `type`.
fn classify_json(line: &str) -> Option<LogKind> {
    let value: Value = serde_json::from_str(line).ok()?;
    let object = value.as_object()?;

    if let Some(message_type) = object.get("message_type").and_then(Value::as_str) {
        return Some(match message_type {
            "status" => LogKind::Progress,
            "summary" => LogKind::Stats,
            "error" | "exit_error" => LogKind::Error,
            _ => LogKind::Info,
        });
    }

    match object.get("type").and_then(Value::as_str) {
        Some("archive_progress" | "progress_percent" | "progress_message") => {
            Some(LogKind::Progress)
        }
        Some("log_message") => {
            let level = object.get("levelname").and_then(Value::as_str);
            Some(if matches!(level, Some("ERROR" | "CRITICAL")) {
                LogKind::Error
            } else {
                LogKind::Info
            })
        }
        Some(_) => Some(LogKind::Info),
        None if object.contains_key("archive") => Some(LogKind::Stats),
        None => None,
    }
}

fn is_error(line: &str) -> bool {
    if ERROR_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return true;
    }
    if line.starts_with("rsync:") && (line.contains("failed") || line.contains("error")) {
        return true;
    }
    ERROR_FRAGMENTS.iter().any(|fragment| line.contains(fragment))
}

fn is_success(line: &str) -> bool {
    (line.starts_with("snapshot ") && line.ends_with(" saved"))
        || line.starts_with("successfully ")
        || line.starts_with("Successfully ")
}

fn is_stats(line: &str) -> bool {
    STATS_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

fn is_progress(line: &str) -> bool {
    if line.contains("to-chk=") || line.contains("to-check=") || line.contains("xfr#") {
        return true;
    }
    has_percentage(line) || line.contains("B/s") || line.contains("bytes/sec")
}

/// True when the line holds a number immediately followed by `%`.
fn has_percentage(line: &str) -> bool {
    line.match_indices('%').any(|(index, _)| {
        line[..index]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    })
}
