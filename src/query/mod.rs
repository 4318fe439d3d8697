//! Retrieval plus generation: turning a question into an answer.
//!
//! The index supplies the most relevant passages; a [`Generator`] (normally
//! the OpenAI-compatible client in [`openai`]) writes the answer from them.

pub mod openai;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::RetrievalIndex;

/// Errors from a live query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Upstream query failed: {0}")]
    UpstreamQueryFailed(String),
}

/// A corpus passage that contributed to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePassage {
    /// Document path relative to the corpus root.
    pub path: PathBuf,
    pub title: String,
    pub text: String,
    /// Relevance score from the index (higher is better).
    pub score: f32,
}

/// The full result of one query: answer text plus its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub response: String,
    #[serde(default)]
    pub source_nodes: Vec<SourcePassage>,
}

impl AnswerResult {
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            source_nodes: vec![],
        }
    }
}

impl fmt::Display for AnswerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}

/// Writes an answer to `question` from the retrieved `passages`.
pub trait Generator: Send + Sync {
    /// # Errors
    ///
    /// Returns `QueryError::UpstreamQueryFailed` if the service errors,
    /// times out, or no credential is configured.
    fn generate(&self, question: &str, passages: &[SourcePassage]) -> Result<String, QueryError>;
}

/// Anything that can answer a question. The answer cache sits on top of this.
pub trait QueryEngine: Send + Sync {
    /// # Errors
    ///
    /// Returns `QueryError::UpstreamQueryFailed` when no answer could be
    /// produced.
    fn query(&self, question: &str) -> Result<AnswerResult, QueryError>;
}

impl<E: QueryEngine + ?Sized> QueryEngine for Arc<E> {
    fn query(&self, question: &str) -> Result<AnswerResult, QueryError> {
        (**self).query(question)
    }
}

/// Answer `question` against `index`: retrieve `top_k` passages, then
/// generate. Every call goes to the generator; nothing is cached here.
///
/// # Errors
///
/// Returns `QueryError::UpstreamQueryFailed` if retrieval or generation fails.
pub fn query(
    index: &RetrievalIndex,
    generator: &dyn Generator,
    question: &str,
    top_k: usize,
) -> Result<AnswerResult, QueryError> {
    let started = Instant::now();

    let passages = index
        .retrieve(question, top_k)
        .map_err(|e| QueryError::UpstreamQueryFailed(format!("retrieval: {e}")))?;

    let response = generator.generate(question, &passages).inspect_err(|e| {
        tracing::warn!(error = %e, "generation failed");
    })?;

    tracing::info!(
        passages = passages.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "query answered"
    );

    Ok(AnswerResult {
        response,
        source_nodes: passages,
    })
}

/// Query engine over a retrieval index and a generator.
pub struct IndexQueryEngine<G> {
    index: Arc<RetrievalIndex>,
    generator: G,
    top_k: usize,
}

impl<G: Generator> IndexQueryEngine<G> {
    #[must_use]
    pub fn new(index: Arc<RetrievalIndex>, generator: G, top_k: usize) -> Self {
        Self {
            index,
            generator,
            top_k,
        }
    }

    #[must_use]
    pub fn index(&self) -> &RetrievalIndex {
        &self.index
    }
}

impl<G: Generator> QueryEngine for IndexQueryEngine<G> {
    fn query(&self, question: &str) -> Result<AnswerResult, QueryError> {
        query(&self.index, &self.generator, question, self.top_k)
    }
}
