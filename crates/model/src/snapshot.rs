use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

const SHORT_ID_LEN: usize = 8;

/// A point-in-time backup recorded inside a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Identifier accepted by the tool's restore and listing commands.
    pub id: String,
    /// Prefix of `id` that matches no other snapshot of the repository.
    pub short_id: String,
    /// ISO-8601 creation time as reported by the tool.
    pub time: String,
    /// Paths captured by the snapshot.
    pub paths: Vec<String>,
    /// Host the snapshot was taken on.
    pub hostname: String,
    /// User that ran the backup, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Tags attached to the snapshot.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Snapshot {
    /// Returns the first eight characters of `id`.
    #[must_use]
    pub fn short_id_of(id: &str) -> String {
        id.chars().take(SHORT_ID_LEN).collect()
    }
}

/// Kind of a filesystem entry inside a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link.
    Symlink,
    /// Anything else (device, fifo, socket).
    Other,
}

impl EntryKind {
    /// Maps the type markers used by borg (`-`, `d`, `l`) and restic (`file`, `dir`, `symlink`).
    #[must_use]
    pub fn from_marker(marker: &str) -> Self {
        match marker {
            "-" | "file" | "f" => Self::File,
            "d" | "dir" => Self::Dir,
            "l" | "symlink" => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// One path contained in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Absolute path inside the snapshot.
    pub path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Modification time, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}
