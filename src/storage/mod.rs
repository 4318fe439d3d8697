//! Persisted index snapshot location.
//!
//! A snapshot is a directory holding the search index files plus a
//! `manifest.json`. Whether anything exists at that location (other than an
//! empty directory) is the only signal used to decide between building and
//! loading an index.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::corpus::Manifest;

const MANIFEST_FILE: &str = "manifest.json";

/// Errors that can occur during snapshot storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Failed to read: {0}")]
    ReadError(String),

    #[error("Failed to write: {0}")]
    WriteError(String),

    #[error("Failed to parse manifest: {0}")]
    ParseError(String),

    #[error("Failed to serialize: {0}")]
    SerializeError(String),
}

/// Local filesystem location of a persisted index snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStorage {
    root: PathBuf,
}

impl SnapshotStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Whether a snapshot is present at the storage location.
    ///
    /// A missing path or an empty directory is absent. Anything else that
    /// exists counts as present, even a regular file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ReadError` if the path exists but cannot be
    /// inspected.
    pub fn is_populated(&self) -> Result<bool, StorageError> {
        let read_failed =
            |e: io::Error| StorageError::ReadError(format!("{}: {e}", self.root.display()));

        let metadata = match fs::metadata(&self.root) {
            Ok(metadata) => metadata,
            Err(e) if is_absent(&e) => return Ok(false),
            Err(e) => return Err(read_failed(e)),
        };

        if !metadata.is_dir() {
            return Ok(true);
        }

        let mut entries = fs::read_dir(&self.root).map_err(read_failed)?;
        Ok(entries.next().is_some())
    }

    /// Create the storage directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteError` if the directory cannot be created.
    pub fn prepare(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| StorageError::WriteError(format!("create dir {}: {e}", self.root.display())))
    }

    /// Read the snapshot manifest.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no manifest was written.
    /// Returns `StorageError::ReadError` or `StorageError::ParseError` if it
    /// cannot be read or parsed.
    pub fn read_manifest(&self) -> Result<Manifest, StorageError> {
        let path = self.manifest_path();

        if !path.exists() {
            return Err(StorageError::NotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| StorageError::ReadError(format!("{}: {e}", path.display())))?;

        serde_json::from_str(&contents)
            .map_err(|e| StorageError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Write the snapshot manifest.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the manifest cannot be serialized or written.
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), StorageError> {
        self.prepare()?;

        let path = self.manifest_path();
        let contents = serde_json::to_string_pretty(manifest)
            .map_err(|e| StorageError::SerializeError(e.to_string()))?;

        fs::write(&path, contents)
            .map_err(|e| StorageError::WriteError(format!("{}: {e}", path.display())))
    }
}

fn is_absent(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
