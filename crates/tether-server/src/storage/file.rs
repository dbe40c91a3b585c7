//! File-backed storage

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

use super::{StorageError, Store};

type Buckets = HashMap<String, HashMap<String, String>>;

/// Durable key/value store backed by a single JSON document on disk.
///
/// Values are base64-encoded in the document. Every mutation is written
/// through to disk before it returns, so a successfully persisted value
/// survives a restart. The file is created on first open with
/// world-readable permissions.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    buckets: RwLock<Buckets>,
}

impl FileStore {
    /// Open the store at `path`, creating the file if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let buckets: Buckets = if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|e| StorageError::Open(format!("{}: {e}", path.display())))?;
            if raw.is_empty() {
                Buckets::new()
            } else {
                serde_json::from_slice(&raw)
                    .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?
            }
        } else {
            let empty = Buckets::new();
            write_document(&path, &empty)?;
            set_world_readable(&path)?;
            info!(path = %path.display(), "created store file");
            Buckets::new()
        };

        Ok(Self {
            path,
            buckets: RwLock::new(buckets),
        })
    }

    /// Serialize the in-memory document and write it through to disk.
    /// Called with the write lock held so writers cannot interleave.
    fn persist(&self, buckets: &Buckets) -> Result<(), StorageError> {
        write_document(&self.path, buckets)
    }
}

fn write_document(path: &Path, buckets: &Buckets) -> Result<(), StorageError> {
    let doc = serde_json::to_vec(buckets)
        .map_err(|e| StorageError::Persist(e.to_string()))?;
    std::fs::write(path, doc)
        .map_err(|e| StorageError::Persist(format!("{}: {e}", path.display())))
}

#[cfg(unix)]
fn set_world_readable(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
        .map_err(|e| StorageError::Open(e.to_string()))
}

#[cfg(not(unix))]
fn set_world_readable(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

impl Store for FileStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let buckets = self.buckets.read().unwrap();
        match buckets.get(bucket).and_then(|b| b.get(key)) {
            None => Ok(None),
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| StorageError::Corrupt(e.to_string())),
        }
    }

    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().unwrap();
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), STANDARD.encode(value));
        self.persist(&buckets)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let mut buckets = self.buckets.write().unwrap();
        let removed = buckets
            .get_mut(bucket)
            .map(|b| b.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            self.persist(&buckets)?;
        }
        Ok(removed)
    }

    fn list(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let buckets = self.buckets.read().unwrap();
        Ok(buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default())
    }
}
