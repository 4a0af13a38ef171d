//! Artifact storage.
//!
//! **SoC:** stores move opaque bytes. Decoding and validation belong to the
//! cache, retry policy too.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;
use types::ModelKind;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("invalid blob name '{0}'")]
    InvalidName(String),

    #[error("I/O error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(name.to_string())
        } else {
            StorageError::Io {
                name: name.to_string(),
                source,
            }
        }
    }
}

/// Storage file name of a model's artifact.
pub fn artifact_name(kind: ModelKind) -> String {
    format!("demand_{}.json", kind.as_str())
}

/// Byte storage for artifacts and auxiliary reports.
///
/// Implementors must be `Send + Sync`: the cache reads from concurrent
/// request threads.
pub trait ArtifactStore: Send + Sync {
    /// Read a named blob.
    fn load_blob(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace a named blob. Readers observe either the old or the new
    /// content, never a partial write.
    fn save_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    fn load(&self, kind: ModelKind) -> Result<Vec<u8>, StorageError> {
        self.load_blob(&artifact_name(kind))
    }

    fn save(&self, kind: ModelKind, bytes: &[u8]) -> Result<(), StorageError> {
        self.save_blob(&artifact_name(kind), bytes)
    }
}

fn check_name(name: &str) -> Result<(), StorageError> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|f| f == name);
    if plain {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

// =============================================================================
// Directory store
// =============================================================================

/// Blobs as files in one directory, written via temp file + rename.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ArtifactStore for DirectoryStore {
    fn load_blob(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        check_name(name)?;
        fs::read(self.path_of(name)).map_err(|e| StorageError::io(name, e))
    }

    fn save_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        check_name(name)?;
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io(name, e))?;

        let target = self.path_of(name);
        let tmp = self
            .root
            .join(format!(".{name}.tmp-{}", std::process::id()));
        fs::write(&tmp, bytes).map_err(|e| StorageError::io(name, e))?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::io(name, e));
        }

        debug!(path = %target.display(), bytes = bytes.len(), "Saved blob");
        Ok(())
    }
}

// =============================================================================
// Memory store
// =============================================================================

/// Blobs held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.blobs.write().remove(name).is_some()
    }
}

impl ArtifactStore for MemoryStore {
    fn load_blob(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn save_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        check_name(name)?;
        self.blobs.write().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_round_trip_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("models"));

        assert!(matches!(
            store.load(ModelKind::Linear),
            Err(StorageError::NotFound(_))
        ));

        store.save(ModelKind::Linear, b"{}").unwrap();
        assert_eq!(store.load(ModelKind::Linear).unwrap(), b"{}");
        assert!(store.path_of("demand_linear.json").exists());

        // No temp files left behind.
        let names: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.save_blob("report.json", b"old").unwrap();
        store.save_blob("report.json", b"new").unwrap();
        assert_eq!(store.load_blob("report.json").unwrap(), b"new");
    }

    #[test]
    fn test_rejects_path_like_names() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.save_blob("../escape.json", b""),
            Err(StorageError::InvalidName(_))
        ));
        assert!(store.save_blob("demand_poisson.json", b"x").is_ok());
        assert!(store.remove("demand_poisson.json"));
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(
            artifact_name(ModelKind::GradientBoosting),
            "demand_gradient_boosting.json"
        );
    }
}
