//! Rules corpus loading and snapshot manifest types.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

/// Passages longer than this are split on line boundaries.
const MAX_PASSAGE_CHARS: usize = 1_500;

/// Errors that can occur when loading a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Corpus directory not found at {0}")]
    NotFound(PathBuf),

    #[error("Corpus at {0} contains no readable documents")]
    Empty(PathBuf),

    #[error("Failed to read corpus: {0}")]
    ReadError(String),
}

/// A single source document read from the corpus directory.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to corpus root (e.g., "2022/kickoff.md").
    pub path: PathBuf,
    /// First markdown heading, or the file stem when there is none.
    pub title: String,
    /// Raw document text.
    pub content: String,
}

impl Document {
    /// Create a document, deriving its title from the content.
    #[must_use]
    pub fn new(path: PathBuf, content: String) -> Self {
        let title = derive_title(&path, &content);
        Self {
            path,
            title,
            content,
        }
    }

    /// Split the document into paragraph-sized passages.
    ///
    /// Paragraphs are separated by blank lines, with CRLF line endings read
    /// as LF. A paragraph made only of
    /// markdown headings is attached to the paragraph after it. Oversized
    /// paragraphs are broken on line boundaries so no passage exceeds
    /// `MAX_PASSAGE_CHARS` unless a single line does.
    #[must_use]
    pub fn passages(&self) -> Vec<String> {
        let mut passages = Vec::new();
        let mut headings = String::new();
        let content = self.content.replace("\r\n", "\n");

        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if paragraph.lines().all(|line| line.trim_start().starts_with('#')) {
                if !headings.is_empty() {
                    headings.push('\n');
                }
                headings.push_str(paragraph);
                continue;
            }

            let paragraph = if headings.is_empty() {
                paragraph.to_string()
            } else {
                format!("{}\n{paragraph}", std::mem::take(&mut headings))
            };

            if paragraph.len() <= MAX_PASSAGE_CHARS {
                passages.push(paragraph);
                continue;
            }

            let mut current = String::new();
            for line in paragraph.lines() {
                if !current.is_empty() && current.len() + line.len() + 1 > MAX_PASSAGE_CHARS {
                    passages.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
            }
            if !current.is_empty() {
                passages.push(current);
            }
        }

        if !headings.is_empty() {
            passages.push(headings);
        }

        passages
    }
}

fn derive_title(path: &Path, content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default()
        })
}

/// A loaded corpus: every readable document under a root directory.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub root: PathBuf,
    pub documents: Vec<Document>,
}

impl Corpus {
    /// Load every document under `root`, recursively, in sorted path order.
    ///
    /// Hidden files and directories are skipped. `.pdf` files are read
    /// through text extraction; every other file must be UTF-8 text. Files
    /// that cannot be read either way are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::NotFound` if `root` is not a directory.
    /// Returns `CorpusError::ReadError` if the directory cannot be walked.
    /// Returns `CorpusError::Empty` if no document could be read.
    pub fn load(root: &Path) -> Result<Self, CorpusError> {
        if !root.is_dir() {
            return Err(CorpusError::NotFound(root.to_path_buf()));
        }

        let mut documents = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walker {
            let entry =
                entry.map_err(|e| CorpusError::ReadError(format!("{}: {e}", root.display())))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let full_path = entry.path();
            let relative = full_path.strip_prefix(root).unwrap_or(full_path);

            match read_text(full_path) {
                Ok(content) => documents.push(Document::new(relative.to_path_buf(), content)),
                Err(e) => {
                    tracing::warn!(
                        path = %full_path.display(),
                        error = %e,
                        "skipping unreadable document"
                    );
                }
            }
        }

        if documents.is_empty() {
            return Err(CorpusError::Empty(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            documents,
        })
    }

    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

/// Read a file's text, extracting it from PDFs.
fn read_text(path: &Path) -> Result<String, String> {
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| format!("PDF extraction: {e}"))
    } else {
        fs::read_to_string(path).map_err(|e| e.to_string())
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// One indexed document as recorded in the snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub title: String,
    pub passages: usize,
}

/// The manifest.json written next to a persisted index.
///
/// Records which corpus the index was built from. It is written after the
/// index itself, so its presence marks a complete snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub corpus_root: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub documents: Vec<ManifestEntry>,
}

impl Manifest {
    #[must_use]
    pub fn for_corpus(corpus: &Corpus) -> Self {
        Self {
            version: "1".to_string(),
            corpus_root: corpus.root.clone(),
            created_at: chrono::Utc::now(),
            documents: corpus
                .documents()
                .iter()
                .map(|doc| ManifestEntry {
                    path: doc.path.clone(),
                    title: doc.title.clone(),
                    passages: doc.passages().len(),
                })
                .collect(),
        }
    }

    /// Total number of passages across all documents.
    #[must_use]
    pub fn passage_count(&self) -> usize {
        self.documents.iter().map(|doc| doc.passages).sum()
    }
}
