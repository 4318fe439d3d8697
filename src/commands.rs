//! Command implementations behind the CLI.
//!
//! These are the host side of the crate: they obtain the index once per
//! process, create one answer cache per session, and render results.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cache::AnswerCache;
use crate::config::Config;
use crate::index::manager::IndexManager;
use crate::index::{IndexOrigin, RetrievalIndex};
use crate::query::openai::OpenAiGenerator;
use crate::query::{AnswerResult, IndexQueryEngine, QueryEngine};

/// Delay between words when typing out an answer.
const TYPING_DELAY: Duration = Duration::from_millis(20);

/// Chat session backed by the live index and the configured upstream service.
pub type LiveSession = AnswerCache<IndexQueryEngine<OpenAiGenerator>>;

/// What `index` found or did.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub storage: PathBuf,
    pub origin: IndexOrigin,
    pub documents: usize,
    pub passages: usize,
}

/// Obtain the configured index through the process-wide manager.
///
/// # Errors
///
/// Returns an error if the index can be neither loaded nor built.
pub fn obtain(config: &Config) -> anyhow::Result<Arc<RetrievalIndex>> {
    let index = IndexManager::global()
        .obtain_index(&config.index.storage_path(), &config.index.data_path())?;
    Ok(index)
}

/// Build or load the index and report which happened.
///
/// # Errors
///
/// Returns an error if the index can be neither loaded nor built.
pub fn index(config: &Config) -> anyhow::Result<IndexSummary> {
    let index = obtain(config)?;
    let manifest = index.manifest();

    Ok(IndexSummary {
        storage: index.location().to_path_buf(),
        origin: index.origin(),
        documents: manifest.documents.len(),
        passages: manifest.passage_count(),
    })
}

/// Start a fresh session over the configured index and upstream service.
///
/// # Errors
///
/// Returns an error if the index cannot be obtained or the HTTP client
/// cannot be created.
pub fn open_session(config: &Config) -> anyhow::Result<LiveSession> {
    let index = obtain(config)?;
    let generator = OpenAiGenerator::from_config(&config.upstream)?;
    let engine = IndexQueryEngine::new(index, generator, config.index.top_k);
    Ok(AnswerCache::new(engine))
}

/// Answer a single question in a throwaway session.
///
/// # Errors
///
/// Returns an error if startup fails or the upstream query fails.
pub fn ask(config: &Config, question: &str) -> anyhow::Result<AnswerResult> {
    if question.trim().is_empty() {
        anyhow::bail!("Question cannot be empty");
    }

    let session = open_session(config)?;
    Ok(session.answer(question)?)
}

/// Run an interactive session: one question per input line.
///
/// Lines starting with `:` are commands: `:history` prints every cached
/// question and answer, `:last` prints the last upstream response as JSON,
/// `:quit` ends the session. Upstream failures are reported and the session
/// continues.
///
/// # Errors
///
/// Returns an error only if reading input or writing output fails.
pub fn chat<E: QueryEngine>(
    session: &AnswerCache<E>,
    input: impl BufRead,
    mut output: impl Write,
    typing: bool,
) -> anyhow::Result<()> {
    writeln!(output, "Ask a question about the rules (:history, :last, :quit)")?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();

        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":history" => write!(output, "{}", format_history(&session.history()))?,
            ":last" => match session.last_response() {
                Some(result) => writeln!(output, "{}", serde_json::to_string_pretty(&result)?)?,
                None => writeln!(output, "Ask a question before seeing the response data")?,
            },
            question => {
                writeln!(output, "user: {question}")?;
                match session.answer(question) {
                    Ok(result) => {
                        write!(output, "ai: ")?;
                        let delay = typing.then_some(TYPING_DELAY);
                        type_out(&result.response, &mut output, delay)?;
                        writeln!(output)?;
                    }
                    Err(e) => writeln!(output, "Error: {e}")?,
                }
            }
        }

        output.flush()?;
    }

    Ok(())
}

/// Write `text` word by word, pausing `delay` between words when set.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn type_out(
    text: &str,
    output: &mut impl Write,
    delay: Option<Duration>,
) -> std::io::Result<()> {
    for (i, word) in text.split(' ').enumerate() {
        if i > 0 {
            output.write_all(b" ")?;
        }
        output.write_all(word.as_bytes())?;

        if let Some(delay) = delay {
            output.flush()?;
            thread::sleep(delay);
        }
    }
    Ok(())
}

/// Render cached entries as a two-column table.
#[must_use]
pub fn format_history(entries: &[(String, AnswerResult)]) -> String {
    use std::fmt::Write;

    if entries.is_empty() {
        return "No questions asked yet\n".to_string();
    }

    let width = entries
        .iter()
        .map(|(question, _)| question.chars().count())
        .max()
        .unwrap_or(0)
        .max("question".len());

    let mut table = String::new();
    let _ = writeln!(table, "{:<width$} | answer", "question");
    let _ = writeln!(table, "{}-+-{}", "-".repeat(width), "-".repeat(6));
    for (question, result) in entries {
        let answer = result.response.replace('\n', " ");
        let _ = writeln!(table, "{question:<width$} | {answer}");
    }
    table
}
