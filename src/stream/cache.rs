//! Local content cache boundary and its on-disk implementation.
//!
//! The streaming handler only needs three things from a cache: look up a key,
//! open a write-through entry, and have that entry either committed (visible
//! to future lookups) or aborted (no trace left). [`DirCache`] implements
//! that over a directory, versioned by app version so an upgrade never serves
//! stale blobs, with write-temp-then-rename commits.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A cached blob plus the metadata recorded at commit time.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    /// The cached bytes.
    pub bytes: Bytes,
    /// Content type recorded when the entry was written.
    pub content_type: Option<String>,
}

/// Write half of one in-progress cache entry.
///
/// An entry becomes visible only after [`CacheWriter::commit`]; dropping a
/// writer without committing must leave the cache as if the write never
/// happened.
pub trait CacheWriter: Send {
    /// Append a chunk to the pending entry.
    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Publish the pending entry for future lookups.
    fn commit(self: Box<Self>) -> io::Result<()>;

    /// Discard the pending entry.
    fn abort(self: Box<Self>);
}

/// Content-addressed local cache.
pub trait ContentCache: Send + Sync + fmt::Debug {
    /// Look up a previously committed entry.
    fn read(&self, key: &str) -> io::Result<Option<CachedEntry>>;

    /// Open a write-through entry for `key`.
    fn begin_write(&self, key: &str, content_type: Option<&str>)
    -> io::Result<Box<dyn CacheWriter>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    content_type: Option<String>,
}

/// Directory-backed [`ContentCache`].
///
/// Entries live under `<dir>/v<app_version>/`; keys are base64url-encoded
/// into file names, so any string (URLs included) is a valid key. Each entry
/// is a `.bin` file plus a `.meta` JSON sidecar, both renamed into place on
/// commit.
#[derive(Debug)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    /// Cache rooted at `dir`, namespaced by `app_version`.
    pub fn open(dir: impl Into<PathBuf>, app_version: &str) -> io::Result<Self> {
        let root = dir.into().join(format!("v{app_version}"));
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Cache namespaced by this crate's own version.
    pub fn open_default(dir: impl Into<PathBuf>) -> io::Result<Self> {
        Self::open(dir, env!("CARGO_PKG_VERSION"))
    }

    /// The versioned directory entries live in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.bin", URL_SAFE_NO_PAD.encode(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.meta", URL_SAFE_NO_PAD.encode(key)))
    }
}

impl ContentCache for DirCache {
    fn read(&self, key: &str) -> io::Result<Option<CachedEntry>> {
        let bytes = match std::fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let content_type = std::fs::read(self.meta_path(key))
            .ok()
            .and_then(|raw| serde_json::from_slice::<EntryMeta>(&raw).ok())
            .and_then(|meta| meta.content_type);
        Ok(Some(CachedEntry {
            bytes: Bytes::from(bytes),
            content_type,
        }))
    }

    fn begin_write(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> io::Result<Box<dyn CacheWriter>> {
        let final_path = self.entry_path(key);
        let tmp_path = final_path.with_extension("tmp");
        let file = File::create(&tmp_path)?;
        Ok(Box::new(DirCacheWriter {
            file: Some(file),
            tmp_path,
            final_path,
            meta_path: self.meta_path(key),
            content_type: content_type.map(str::to_owned),
            committed: false,
        }))
    }
}

struct DirCacheWriter {
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    meta_path: PathBuf,
    content_type: Option<String>,
    committed: bool,
}

impl CacheWriter for DirCacheWriter {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk),
            None => Err(io::Error::other("cache writer already closed")),
        }
    }

    fn commit(mut self: Box<Self>) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        let meta = EntryMeta {
            content_type: self.content_type.take(),
        };
        std::fs::write(
            &self.meta_path,
            serde_json::to_vec(&meta).map_err(io::Error::other)?,
        )?;
        std::fs::rename(&self.tmp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }

    fn abort(self: Box<Self>) {
        // Drop does the cleanup.
    }
}

impl Drop for DirCacheWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file.take();
        if let Err(err) = std::fs::remove_file(&self.tmp_path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    "failed to discard aborted cache entry {}: {err}",
                    self.tmp_path.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_makes_an_entry_visible() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::open(dir.path(), "1.0").unwrap();

        assert!(cache.read("https://api.test/file/42").unwrap().is_none());

        let mut writer = cache
            .begin_write("https://api.test/file/42", Some("image/png"))
            .unwrap();
        writer.write(b"abc").unwrap();
        writer.write(b"def").unwrap();
        writer.commit().unwrap();

        let entry = cache.read("https://api.test/file/42").unwrap().unwrap();
        assert_eq!(&entry.bytes[..], b"abcdef");
        assert_eq!(entry.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn abort_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::open(dir.path(), "1.0").unwrap();

        let mut writer = cache.begin_write("key", None).unwrap();
        writer.write(b"partial").unwrap();
        writer.abort();

        assert!(cache.read("key").unwrap().is_none());
        // The versioned directory holds no leftover temp files.
        let leftovers: Vec<_> = std::fs::read_dir(cache.root()).unwrap().collect();
        assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
    }

    #[test]
    fn versions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let old = DirCache::open(dir.path(), "1.0").unwrap();
        let mut writer = old.begin_write("key", None).unwrap();
        writer.write(b"old").unwrap();
        writer.commit().unwrap();

        let new = DirCache::open(dir.path(), "2.0").unwrap();
        assert!(new.read("key").unwrap().is_none());
        assert!(old.read("key").unwrap().is_some());
    }
}
