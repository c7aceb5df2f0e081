//! Durable key-value persistence boundary for credentials.
//!
//! The credential store only requires atomic multi-key commit semantics:
//! `put` either lands every entry or none of them. [`FileVault`] implements
//! that with a write-temp-then-rename JSON file; [`MemoryVault`] backs tests
//! and callers that opt out of persistence.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Key-value persistence with atomic multi-key commits.
///
/// All methods report success as a plain `bool`: persistence failures are
/// retried by the credential store, never silently swallowed.
pub trait Vault: Send + Sync + fmt::Debug {
    /// Commit every entry atomically. Returns `true` only if the commit landed.
    fn put(&self, entries: &[(&str, String)]) -> bool;

    /// Read back everything previously committed.
    fn get_all(&self) -> HashMap<String, String>;

    /// Remove all stored entries. Returns `true` only if the clear landed.
    fn clear(&self) -> bool;
}

/// JSON-file-backed [`Vault`].
///
/// Commits write the whole map to `<path>.tmp` and rename it into place, so a
/// crash mid-write never leaves a torn record. On Unix the file is created
/// with `0o600` permissions, same discipline as any other bearer secret on
/// disk.
#[derive(Debug)]
pub struct FileVault {
    path: PathBuf,
    // Serializes read-modify-write cycles between concurrent committers.
    write_lock: Mutex<()>,
}

impl FileVault {
    /// Vault persisting to `path` (created on first commit).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> HashMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    fn write_map(&self, map: &HashMap<String, String>) -> std::io::Result<()> {
        let encoded = serde_json::to_string_pretty(map)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, encoded)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)
    }
}

impl Vault for FileVault {
    fn put(&self, entries: &[(&str, String)]) -> bool {
        let _guard = self.write_lock.lock().expect("vault lock poisoned");
        let mut map = self.read_map();
        for (key, value) in entries {
            map.insert((*key).to_owned(), value.clone());
        }
        match self.write_map(&map) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("credential vault commit to {} failed: {err}", self.path.display());
                false
            }
        }
    }

    fn get_all(&self) -> HashMap<String, String> {
        let _guard = self.write_lock.lock().expect("vault lock poisoned");
        self.read_map()
    }

    fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().expect("vault lock poisoned");
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!("credential vault clear of {} failed: {err}", self.path.display());
                false
            }
        }
    }
}

/// In-memory [`Vault`] for tests and persistence-free clients.
///
/// `fail_next(n)` makes the next `n` commits report failure, which is how the
/// store's retry loop is exercised.
#[derive(Debug, Default)]
pub struct MemoryVault {
    map: Mutex<HashMap<String, String>>,
    failures: AtomicU32,
}

impl MemoryVault {
    /// Fresh empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `put`/`clear` calls fail.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Vault for MemoryVault {
    fn put(&self, entries: &[(&str, String)]) -> bool {
        if self.should_fail() {
            return false;
        }
        let mut map = self.map.lock().expect("vault lock poisoned");
        for (key, value) in entries {
            map.insert((*key).to_owned(), value.clone());
        }
        true
    }

    fn get_all(&self) -> HashMap<String, String> {
        self.map.lock().expect("vault lock poisoned").clone()
    }

    fn clear(&self) -> bool {
        if self.should_fail() {
            return false;
        }
        self.map.lock().expect("vault lock poisoned").clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_vault_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("creds.json"));

        assert!(vault.put(&[("a", "1".into()), ("b", "2".into())]));
        assert!(vault.put(&[("b", "3".into())]));

        let map = vault.get_all();
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("3"));

        assert!(vault.clear());
        assert!(vault.get_all().is_empty());
        // Clearing an already-empty vault still commits.
        assert!(vault.clear());
    }

    #[test]
    fn memory_vault_scripted_failures() {
        let vault = MemoryVault::new();
        vault.fail_next(2);
        assert!(!vault.put(&[("k", "v".into())]));
        assert!(!vault.put(&[("k", "v".into())]));
        assert!(vault.put(&[("k", "v".into())]));
        assert_eq!(vault.get_all().len(), 1);
    }
}
