//! Result and transcript rendering.

use std::io::{self, Write};

use model::{BackupResult, EntryKind, ExecutionLog, FileEntry, Snapshot};
use serde::Serialize;

/// One transcript entry as a stderr line.
pub fn log_line<W: Write>(out: &mut W, log: &ExecutionLog) -> io::Result<()> {
    writeln!(out, "[{:>8}] {}", log.kind, log.message)
}

/// Writes `value` as one line of JSON.
pub fn json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value).map_err(io::Error::from)?;
    writeln!(out)
}

/// Human-readable summary of a backup or restore.
pub fn result<W: Write>(out: &mut W, operation: &str, result: &BackupResult) -> io::Result<()> {
    let status = if result.success { "succeeded" } else { "failed" };
    let elapsed = result.end_time - result.start_time;
    writeln!(
        out,
        "{operation} {status} in {:.1}s",
        elapsed.as_seconds_f64()
    )?;
    if let Some(files) = result.files_processed {
        writeln!(out, "files: {files}")?;
    }
    if let Some(bytes) = result.bytes_processed {
        writeln!(out, "bytes: {bytes}")?;
    }
    for warning in &result.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    for error in &result.errors {
        writeln!(out, "error: {error}")?;
    }
    Ok(())
}

/// One line per snapshot: short id, time, host, and paths.
pub fn snapshots<W: Write>(out: &mut W, snapshots: &[Snapshot]) -> io::Result<()> {
    for snapshot in snapshots {
        writeln!(
            out,
            "{:<10} {:<30} {:<16} {}",
            snapshot.short_id,
            snapshot.time,
            snapshot.hostname,
            snapshot.paths.join(" ")
        )?;
    }
    Ok(())
}

/// `ls`-style listing of snapshot entries.
pub fn files<W: Write>(out: &mut W, entries: &[FileEntry]) -> io::Result<()> {
    for entry in entries {
        let marker = match entry.kind {
            EntryKind::File => '-',
            EntryKind::Dir => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::Other => '?',
        };
        let size = entry
            .size
            .map_or_else(|| "-".to_owned(), |size| size.to_string());
        let modified = entry.modified.as_deref().unwrap_or("-");
        writeln!(out, "{marker} {size:>12} {modified:<25} {}", entry.path)?;
    }
    Ok(())
}
