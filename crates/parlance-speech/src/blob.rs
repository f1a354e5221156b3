//! Durable storage for raw audio bytes.
//!
//! Turns never carry audio inline; they hold an opaque reference produced
//! here. The filesystem impl is the default; anything that can hand back a
//! stable string reference (object store, CDN path) can stand in.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use parlance_core::{Error, Result};

/// Write-once audio blob storage yielding an opaque reference.
pub trait AudioStore: Send + Sync {
    /// Persist the bytes and return a durable reference to them.
    fn put(&self, bytes: &[u8], extension: &str) -> Result<String>;
}

/// Filesystem blob store: one `<uuid>.<ext>` file per blob under a root dir.
pub struct FsAudioStore {
    root: PathBuf,
}

impl FsAudioStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self { root })
    }
}

impl AudioStore for FsAudioStore {
    fn put(&self, bytes: &[u8], extension: &str) -> Result<String> {
        let path = self.root.join(format!("{}.{}", Uuid::new_v4(), extension));
        std::fs::write(&path, bytes).map_err(|e| Error::Storage(e.to_string()))?;
        debug!("Stored {} audio bytes at {}", bytes.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_writes_file_and_returns_reference() {
        let dir = TempDir::new().unwrap();
        let store = FsAudioStore::new(dir.path()).unwrap();

        let reference = store.put(b"RIFF....", "wav").unwrap();
        assert!(reference.ends_with(".wav"));
        assert_eq!(std::fs::read(&reference).unwrap(), b"RIFF....");
    }

    #[test]
    fn each_put_gets_a_fresh_reference() {
        let dir = TempDir::new().unwrap();
        let store = FsAudioStore::new(dir.path()).unwrap();

        let a = store.put(b"one", "mp3").unwrap();
        let b = store.put(b"two", "mp3").unwrap();
        assert_ne!(a, b);
    }
}
