//! Tantivy-backed retrieval index over the rules corpus.
//!
//! Each corpus passage becomes one Tantivy document. The index lives in the
//! snapshot storage directory next to a `manifest.json` describing the
//! corpus it was built from. Once built, an index is never modified.

pub mod manager;

use std::path::{Path, PathBuf};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy};
use thiserror::Error;

use crate::corpus::{Corpus, Manifest};
use crate::query::SourcePassage;
use crate::storage::SnapshotStorage;

/// Default heap size for index writer (50MB).
const WRITER_HEAP_SIZE: usize = 50_000_000;

/// Stemming tokenizer registered by Tantivy by default.
const TOKENIZER: &str = "en_stem";

/// Errors raised while obtaining a retrieval index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Corpus unavailable at {path}: {reason}")]
    CorpusUnavailable { path: PathBuf, reason: String },

    #[error("Failed to write index snapshot to {path}: {reason}")]
    StorageWriteFailed { path: PathBuf, reason: String },

    #[error("Index snapshot at {path} is corrupt: {reason}")]
    StorageCorrupt { path: PathBuf, reason: String },
}

/// How an index came to be in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Built from the corpus and persisted during this call.
    Built,
    /// Deserialized from an existing snapshot.
    Loaded,
}

/// Schema field handles for the Tantivy index.
#[derive(Debug, Clone)]
struct SchemaFields {
    path: Field,
    title: Field,
    text: Field,
}

/// A queryable retrieval index.
pub struct RetrievalIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
    manifest: Manifest,
    origin: IndexOrigin,
    location: PathBuf,
}

impl std::fmt::Debug for RetrievalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalIndex")
            .field("location", &self.location)
            .field("origin", &self.origin)
            .field("documents", &self.manifest.documents.len())
            .finish_non_exhaustive()
    }
}

impl RetrievalIndex {
    /// Build the Tantivy schema for corpus passages.
    ///
    /// Fields:
    /// - `path`: Exact document path, stored for source display
    /// - `title`: Stored only, not searched
    /// - `text`: Stemmed passage body, stored so it can be handed to the generator
    fn build_schema() -> (Schema, SchemaFields) {
        let mut schema_builder = Schema::builder();

        let stemmed = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let path = schema_builder.add_text_field("path", STRING | STORED);
        let title = schema_builder.add_text_field("title", STORED);
        let text = schema_builder.add_text_field("text", stemmed);

        let schema = schema_builder.build();
        (schema, SchemaFields { path, title, text })
    }

    /// Build a new index from every passage of `corpus` and persist it.
    ///
    /// The manifest is written last, after the index has been committed. If
    /// anything fails the partially written storage directory is removed so
    /// the next start does not mistake it for a complete snapshot.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::StorageWriteFailed` if the index or manifest
    /// cannot be written.
    pub fn build(corpus: &Corpus, storage: &SnapshotStorage) -> Result<Self, IndexError> {
        let result = Self::write_snapshot(corpus, storage);

        if result.is_err() {
            if let Err(e) = std::fs::remove_dir_all(storage.root()) {
                tracing::warn!(
                    path = %storage.root().display(),
                    error = %e,
                    "could not remove incomplete index snapshot"
                );
            }
        }

        result
    }

    fn write_snapshot(corpus: &Corpus, storage: &SnapshotStorage) -> Result<Self, IndexError> {
        let location = storage.root().to_path_buf();
        let write_failed = |reason: String| IndexError::StorageWriteFailed {
            path: location.clone(),
            reason,
        };

        storage.prepare().map_err(|e| write_failed(e.to_string()))?;

        let (schema, fields) = Self::build_schema();
        let directory = MmapDirectory::open(&location).map_err(|e| write_failed(e.to_string()))?;
        let index = Index::create(directory, schema, IndexSettings::default())
            .map_err(|e| write_failed(e.to_string()))?;

        let mut writer: IndexWriter = index
            .writer(WRITER_HEAP_SIZE)
            .map_err(|e| write_failed(e.to_string()))?;

        for doc in corpus.documents() {
            let path = doc.path.to_string_lossy();
            for passage in doc.passages() {
                let mut tantivy_doc = tantivy::TantivyDocument::new();
                tantivy_doc.add_text(fields.path, &path);
                tantivy_doc.add_text(fields.title, &doc.title);
                tantivy_doc.add_text(fields.text, &passage);
                writer
                    .add_document(tantivy_doc)
                    .map_err(|e| write_failed(e.to_string()))?;
            }
        }

        writer.commit().map_err(|e| write_failed(e.to_string()))?;

        let manifest = Manifest::for_corpus(corpus);
        storage
            .write_manifest(&manifest)
            .map_err(|e| write_failed(e.to_string()))?;

        let reader = Self::open_reader(&index).map_err(|e| write_failed(e.to_string()))?;

        tracing::info!(
            path = %location.display(),
            documents = manifest.documents.len(),
            passages = manifest.passage_count(),
            "built retrieval index"
        );

        Ok(Self {
            index,
            reader,
            fields,
            manifest,
            origin: IndexOrigin::Built,
            location,
        })
    }

    /// Load a previously persisted index without touching the corpus.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::StorageCorrupt` if the manifest or the index
    /// files cannot be read back.
    pub fn open(storage: &SnapshotStorage) -> Result<Self, IndexError> {
        let location = storage.root().to_path_buf();
        let corrupt = |reason: String| IndexError::StorageCorrupt {
            path: location.clone(),
            reason,
        };

        let manifest = storage.read_manifest().map_err(|e| corrupt(e.to_string()))?;

        let directory = MmapDirectory::open(&location).map_err(|e| corrupt(e.to_string()))?;
        let index = Index::open(directory).map_err(|e| corrupt(e.to_string()))?;

        // Use the stored schema rather than assuming ours
        let schema = index.schema();
        let fields = SchemaFields {
            path: schema.get_field("path").map_err(|e| corrupt(e.to_string()))?,
            title: schema.get_field("title").map_err(|e| corrupt(e.to_string()))?,
            text: schema.get_field("text").map_err(|e| corrupt(e.to_string()))?,
        };

        let reader = Self::open_reader(&index).map_err(|e| corrupt(e.to_string()))?;

        tracing::info!(
            path = %location.display(),
            documents = manifest.documents.len(),
            "loaded retrieval index"
        );

        Ok(Self {
            index,
            reader,
            fields,
            manifest,
            origin: IndexOrigin::Loaded,
            location,
        })
    }

    fn open_reader(index: &Index) -> tantivy::Result<IndexReader> {
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;
        Ok(reader)
    }

    /// Find the `limit` passages most relevant to `question`, best first.
    ///
    /// Query syntax errors are tolerated: whatever part of the question
    /// parses is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the search itself fails.
    pub fn retrieve(&self, question: &str, limit: usize) -> tantivy::Result<Vec<SourcePassage>> {
        if question.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let (query, _errors) = query_parser.parse_query_lenient(question);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut passages = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: tantivy::TantivyDocument = searcher.doc(doc_address)?;
            passages.push(self.doc_to_passage(&doc, score));
        }

        Ok(passages)
    }

    fn doc_to_passage(&self, doc: &tantivy::TantivyDocument, score: f32) -> SourcePassage {
        let text_of = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        SourcePassage {
            path: PathBuf::from(text_of(self.fields.path)),
            title: text_of(self.fields.title),
            text: text_of(self.fields.text),
            score,
        }
    }

    /// The manifest of the corpus this index was built from.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }

    /// Storage directory holding the snapshot.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_corpus(temp_dir: &TempDir) -> Corpus {
        let root = temp_dir.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("kickoff.md"),
            "# Kickoff\n\nRule 1: Kickoffs happen at the start of each half.\n\n\
             After a safety the team kicks from its own 20.",
        )
        .unwrap();
        std::fs::write(
            root.join("scoring.md"),
            "# Scoring\n\nA touchdown is worth six points.\n\nA field goal is worth three points.",
        )
        .unwrap();
        Corpus::load(&root).unwrap()
    }

    #[test]
    fn test_schema_creation() {
        let (schema, _fields) = RetrievalIndex::build_schema();

        assert!(schema.get_field("path").is_ok());
        assert!(schema.get_field("title").is_ok());
        assert!(schema.get_field("text").is_ok());
    }

    #[test]
    fn test_build_persists_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));

        let index = RetrievalIndex::build(&corpus, &storage).unwrap();

        assert_eq!(index.origin(), IndexOrigin::Built);
        assert!(storage.is_populated().unwrap());
        assert_eq!(storage.read_manifest().unwrap(), *index.manifest());
        assert_eq!(index.manifest().passage_count(), 4);
    }

    #[test]
    fn test_retrieve_ranks_relevant_passage_first() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        let index = RetrievalIndex::build(&corpus, &storage).unwrap();

        let passages = index.retrieve("How many points is a touchdown?", 2).unwrap();

        assert!(!passages.is_empty());
        assert!(passages.len() <= 2);
        assert_eq!(passages[0].path, PathBuf::from("scoring.md"));
        assert!(passages[0].text.contains("touchdown"));
    }

    #[test]
    fn test_retrieve_uses_stemming() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        let index = RetrievalIndex::build(&corpus, &storage).unwrap();

        let passages = index.retrieve("kickoff", 1).unwrap();

        assert_eq!(passages.len(), 1);
        assert!(passages[0].text.contains("Kickoffs happen"));
    }

    #[test]
    fn test_retrieve_tolerates_query_syntax() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        let index = RetrievalIndex::build(&corpus, &storage).unwrap();

        assert!(index.retrieve("field goal: (worth \"points", 3).is_ok());
    }

    #[test]
    fn test_empty_question_returns_empty() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        let index = RetrievalIndex::build(&corpus, &storage).unwrap();

        assert!(index.retrieve("   ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_open_reads_back_built_index() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        let built = RetrievalIndex::build(&corpus, &storage).unwrap();
        let expected = built.retrieve("field goal", 2).unwrap();
        drop(built);

        let loaded = RetrievalIndex::open(&storage).unwrap();

        assert_eq!(loaded.origin(), IndexOrigin::Loaded);
        assert_eq!(loaded.retrieve("field goal", 2).unwrap(), expected);
    }

    #[test]
    fn test_open_without_manifest_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        storage.prepare().unwrap();
        std::fs::write(storage.root().join("junk.bin"), b"\x00\x01").unwrap();

        let result = RetrievalIndex::open(&storage);

        assert!(matches!(result, Err(IndexError::StorageCorrupt { .. })));
    }

    #[test]
    fn test_open_with_manifest_but_no_index_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let corpus = create_test_corpus(&temp_dir);
        let storage = SnapshotStorage::new(temp_dir.path().join("storage"));
        storage.write_manifest(&Manifest::for_corpus(&corpus)).unwrap();

        let result = RetrievalIndex::open(&storage);

        assert!(matches!(result, Err(IndexError::StorageCorrupt { .. })));
    }
}
