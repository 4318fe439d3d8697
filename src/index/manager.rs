//! Index lifecycle: build from the corpus or load a persisted snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::corpus::{Corpus, CorpusError};
use crate::index::{IndexError, RetrievalIndex};
use crate::storage::SnapshotStorage;

/// Source of corpus documents for an index build.
pub trait CorpusLoader: Send + Sync {
    /// Read every document under `root`.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError` if the corpus is missing, empty, or unreadable.
    fn load(&self, root: &Path) -> Result<Corpus, CorpusError>;
}

/// Loads documents straight from a directory tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryLoader;

impl CorpusLoader for DirectoryLoader {
    fn load(&self, root: &Path) -> Result<Corpus, CorpusError> {
        Corpus::load(root)
    }
}

/// Obtain an index, loading it from `storage_location` when a snapshot
/// exists and otherwise building it from `corpus_location` and persisting it.
///
/// The corpus is not touched at all when a snapshot exists, and an existing
/// snapshot is never rewritten.
///
/// # Errors
///
/// Returns `IndexError::CorpusUnavailable` if a build is needed and the
/// corpus cannot be read, `IndexError::StorageWriteFailed` if the new
/// snapshot cannot be written, and `IndexError::StorageCorrupt` if
/// something exists at `storage_location` but cannot be read back as a
/// snapshot.
pub fn obtain_index(
    storage_location: &Path,
    corpus_location: &Path,
    loader: &dyn CorpusLoader,
) -> Result<RetrievalIndex, IndexError> {
    let storage = SnapshotStorage::new(storage_location.to_path_buf());

    let populated = storage
        .is_populated()
        .map_err(|e| IndexError::StorageCorrupt {
            path: storage_location.to_path_buf(),
            reason: e.to_string(),
        })?;

    if populated {
        tracing::debug!(storage = %storage_location.display(), "snapshot found, loading");
        return RetrievalIndex::open(&storage);
    }

    tracing::info!(
        storage = %storage_location.display(),
        corpus = %corpus_location.display(),
        "no snapshot found, building index from corpus"
    );

    let corpus = loader
        .load(corpus_location)
        .map_err(|e| IndexError::CorpusUnavailable {
            path: corpus_location.to_path_buf(),
            reason: e.to_string(),
        })?;

    RetrievalIndex::build(&corpus, &storage)
}

type SlotKey = (PathBuf, PathBuf);
type Slot = Arc<Mutex<Option<Arc<RetrievalIndex>>>>;

/// Process-wide memo of obtained indexes, keyed by storage and corpus path.
///
/// Concurrent first callers for the same key serialize on a per-key lock:
/// one of them builds or loads, the rest wait and share its result. Callers
/// for different keys do not block each other. Failures are not remembered,
/// so a later call retries.
pub struct IndexManager {
    loader: Box<dyn CorpusLoader>,
    slots: Mutex<HashMap<SlotKey, Slot>>,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_loader(DirectoryLoader)
    }

    #[must_use]
    pub fn with_loader(loader: impl CorpusLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The manager shared by the whole process.
    #[must_use]
    pub fn global() -> &'static IndexManager {
        static GLOBAL: OnceLock<IndexManager> = OnceLock::new();
        GLOBAL.get_or_init(IndexManager::new)
    }

    /// Memoized [`obtain_index`].
    ///
    /// # Errors
    ///
    /// Propagates any `IndexError` from the underlying build or load.
    pub fn obtain_index(
        &self,
        storage_location: &Path,
        corpus_location: &Path,
    ) -> Result<Arc<RetrievalIndex>, IndexError> {
        let slot = {
            let mut slots = lock(&self.slots);
            let key = (storage_location.to_path_buf(), corpus_location.to_path_buf());
            Arc::clone(slots.entry(key).or_default())
        };

        let mut cached = lock(&slot);
        if let Some(index) = cached.as_ref() {
            tracing::debug!(storage = %storage_location.display(), "reusing memoized index");
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(obtain_index(
            storage_location,
            corpus_location,
            self.loader.as_ref(),
        )?);
        *cached = Some(Arc::clone(&index));
        Ok(index)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
