//! Ordered master-key candidates.
//!
//! Key rotation leaves payloads encrypted under older master secrets in the
//! store. Rather than guessing, the resolver walks a [`KeyRing`] from the
//! current key towards older ones; the historical built-in secret is a named,
//! versioned entry ([`LEGACY_MASTER_KEY`]) instead of a bare string.

use std::fmt;

use model::Secret;

/// Compile-time description of a master key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StaticMasterKey {
    /// Human-readable key name used in diagnostics.
    pub label: &'static str,
    /// Rotation counter of the key.
    pub version: u32,
    secret: &'static str,
}

impl fmt::Debug for StaticMasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMasterKey")
            .field("label", &self.label)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Master secret shipped by releases that predate configurable keys.
pub const LEGACY_MASTER_KEY: StaticMasterKey = StaticMasterKey {
    label: "legacy",
    version: 1,
    secret: "backhaul-default-master-secret",
};

/// One candidate master secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterKey {
    label: String,
    version: u32,
    secret: Secret,
}

impl MasterKey {
    /// Creates a key from its label, version, and secret.
    pub fn new(label: impl Into<String>, version: u32, secret: impl Into<Secret>) -> Self {
        Self {
            label: label.into(),
            version,
            secret: secret.into(),
        }
    }

    /// Diagnostic name of the key.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Rotation counter.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// The secret handed to the cipher.
    #[must_use]
    pub const fn secret(&self) -> &Secret {
        &self.secret
    }
}

impl From<StaticMasterKey> for MasterKey {
    fn from(key: StaticMasterKey) -> Self {
        Self::new(key.label, key.version, key.secret)
    }
}

/// Master keys in the order decryption should try them.
#[derive(Clone, Debug)]
pub struct KeyRing {
    keys: Vec<MasterKey>,
}

impl KeyRing {
    /// Creates a ring holding only `current`.
    #[must_use]
    pub fn new(current: MasterKey) -> Self {
        Self {
            keys: vec![current],
        }
    }

    /// Creates a ring of `current` followed by [`LEGACY_MASTER_KEY`].
    ///
    /// The legacy entry is not duplicated when `current` already holds its secret.
    #[must_use]
    pub fn with_legacy_fallback(current: MasterKey) -> Self {
        let mut ring = Self::new(current);
        ring.push(LEGACY_MASTER_KEY.into());
        ring
    }

    /// Appends an older key. Keys whose secret is already present are skipped.
    pub fn push(&mut self, key: MasterKey) {
        if !self.keys.iter().any(|known| known.secret == key.secret) {
            self.keys.push(key);
        }
    }

    /// The key new payloads are encrypted with.
    #[must_use]
    pub fn primary(&self) -> &MasterKey {
        &self.keys[0]
    }

    /// Iterates the keys in trial order.
    pub fn iter(&self) -> impl Iterator<Item = &MasterKey> {
        self.keys.iter()
    }

    /// Number of candidate keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; a ring holds at least its primary key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_entry_follows_current_key() {
        let ring = KeyRing::with_legacy_fallback(MasterKey::new("current", 3, "rotated"));
        let labels: Vec<_> = ring.iter().map(MasterKey::label).collect();
        assert_eq!(labels, ["current", "legacy"]);
        assert_eq!(ring.primary().version(), 3);
    }

    #[test]
    fn legacy_is_not_duplicated() {
        let current = MasterKey::from(LEGACY_MASTER_KEY);
        let ring = KeyRing::with_legacy_fallback(current);
        assert_eq!(ring.len(), 1);
        assert!(!ring.is_empty());
    }

    #[test]
    fn debug_never_shows_secrets() {
        let key = MasterKey::new("current", 1, "do-not-print");
        assert!(!format!("{key:?}").contains("do-not-print"));
        assert!(!format!("{LEGACY_MASTER_KEY:?}").contains(LEGACY_MASTER_KEY.secret));
    }
}
