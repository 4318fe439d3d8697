//! Per-session answer cache.
//!
//! Every upstream query costs money, so each distinct question (compared
//! case-insensitively) is sent upstream at most once per session. The most
//! recent upstream result is also kept in its own slot for debugging.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::query::{AnswerResult, QueryEngine, QueryError};

/// Canonical cache key for a question.
///
/// Lowercases, trims, and collapses whitespace runs to a single space, so
/// questions differing only in case or spacing share a key.
#[must_use]
pub fn normalize(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Default)]
struct CacheState {
    /// Entries in insertion order.
    entries: Vec<(String, AnswerResult)>,
    /// Key to position in `entries`.
    positions: HashMap<String, usize>,
    last_response: Option<AnswerResult>,
}

/// Answer cache in front of a [`QueryEngine`].
///
/// Construct one per interactive session and drop it when the session ends;
/// nothing is persisted.
pub struct AnswerCache<E> {
    engine: E,
    state: Mutex<CacheState>,
}

impl<E: QueryEngine> AnswerCache<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: Mutex::new(CacheState::default()),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Answer `question`, querying upstream only on the first occurrence of
    /// its normalized form.
    ///
    /// The lock is held across the upstream call so concurrent callers with
    /// the same question cannot both miss.
    ///
    /// # Errors
    ///
    /// Propagates `QueryError::UpstreamQueryFailed` on a miss. Nothing is
    /// stored in that case and the next call queries again.
    pub fn answer(&self, question: &str) -> Result<AnswerResult, QueryError> {
        let key = normalize(question);
        let mut state = self.lock();

        if let Some(&position) = state.positions.get(&key) {
            tracing::debug!(key = %key, "answer cache hit");
            return Ok(state.entries[position].1.clone());
        }

        tracing::debug!(key = %key, "answer cache miss");
        let result = self.engine.query(question)?;

        let position = state.entries.len();
        state.entries.push((key.clone(), result.clone()));
        state.positions.insert(key, position);
        state.last_response = Some(result.clone());

        Ok(result)
    }

    /// All cached `(normalized question, answer)` pairs in the order they were
    /// first asked. The last-response slot is not included.
    #[must_use]
    pub fn history(&self) -> Vec<(String, AnswerResult)> {
        self.lock().entries.clone()
    }

    /// The most recent result obtained from upstream, if any.
    #[must_use]
    pub fn last_response(&self) -> Option<AnswerResult> {
        self.lock().last_response.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
