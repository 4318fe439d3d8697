//! OpenAI-compatible chat completion generator.
//!
//! Requires the `OPENAI_API_KEY` environment variable. The key is checked
//! before any request is made; without it every query fails fast.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::UpstreamConfig;
use crate::query::{Generator, QueryError, SourcePassage};

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world. \
Always answer the query using the provided context information, and not prior knowledge.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [RequestMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Generator backed by `POST {api_base}/chat/completions`.
pub struct OpenAiGenerator {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    /// Create a generator from config, reading the key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::UpstreamQueryFailed` if the HTTP client cannot be
    /// built.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, QueryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QueryError::UpstreamQueryFailed(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Override the credential taken from the environment.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn describe(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            format!("request timed out after {}s", self.timeout_secs)
        } else {
            error.to_string()
        }
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, question: &str, passages: &[SourcePassage]) -> Result<String, QueryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| QueryError::UpstreamQueryFailed(format!("{API_KEY_ENV} not set")))?;

        let prompt = build_prompt(question, passages);
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                RequestMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                RequestMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        tracing::debug!(model = %self.model, passages = passages.len(), "calling chat completions");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .map_err(|e| QueryError::UpstreamQueryFailed(self.describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(QueryError::UpstreamQueryFailed(format!(
                "OpenAI API error {status}: {body}"
            )));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| QueryError::UpstreamQueryFailed(format!("invalid response: {e}")))?;

        parse_answer(body)
    }
}

fn parse_answer(body: ChatResponse) -> Result<String, QueryError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| QueryError::UpstreamQueryFailed("response contained no answer".to_string()))
}

/// Render the question-answering prompt for `question` over `passages`.
#[must_use]
pub fn build_prompt(question: &str, passages: &[SourcePassage]) -> String {
    let mut context = String::new();
    for passage in passages {
        let _ = writeln!(context, "file_path: {}\n", passage.path.display());
        let _ = writeln!(context, "{}\n", passage.text);
    }

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer: ",
        context.trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::time::Instant;

    fn config(api_base: &str) -> UpstreamConfig {
        UpstreamConfig {
            api_base: api_base.to_string(),
            timeout_secs: 2,
            ..UpstreamConfig::default()
        }
    }

    fn passage(text: &str) -> SourcePassage {
        SourcePassage {
            path: PathBuf::from("rules/kickoff.md"),
            title: "Kickoff".to_string(),
            text: text.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn prompt_contains_context_and_query() {
        let prompt = build_prompt(
            "What happens at kickoff?",
            &[passage("Kickoffs happen at the start of each half.")],
        );

        assert!(prompt.starts_with("Context information is below."));
        assert!(prompt.contains("file_path: rules/kickoff.md"));
        assert!(prompt.contains("Kickoffs happen at the start of each half."));
        assert!(prompt.ends_with("Query: What happens at kickoff?\nAnswer: "));
    }

    #[test]
    fn missing_key_fails_before_request() {
        let generator = OpenAiGenerator::from_config(&config("http://127.0.0.1:9"))
            .unwrap()
            .with_api_key(None);

        let result = generator.generate("What happens at kickoff?", &[]);

        assert_eq!(
            result,
            Err(QueryError::UpstreamQueryFailed(format!("{API_KEY_ENV} not set")))
        );
    }

    #[test]
    fn unreachable_service_is_upstream_failure() {
        let generator = OpenAiGenerator::from_config(&config("http://127.0.0.1:9/"))
            .unwrap()
            .with_api_key(Some("test-key".to_string()));

        let result = generator.generate("What happens at kickoff?", &[]);

        assert!(matches!(result, Err(QueryError::UpstreamQueryFailed(_))));
    }

    #[test]
    fn stalled_service_times_out() {
        // Accepts the connection and never answers
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut sink = Vec::new();
                let _ = stream.read_to_end(&mut sink);
            }
        });

        let upstream = UpstreamConfig {
            api_base: format!("http://{address}"),
            timeout_secs: 1,
            ..UpstreamConfig::default()
        };
        let generator = OpenAiGenerator::from_config(&upstream)
            .unwrap()
            .with_api_key(Some("test-key".to_string()));

        let started = Instant::now();
        let result = generator.generate("What happens at kickoff?", &[]);

        assert_eq!(
            result,
            Err(QueryError::UpstreamQueryFailed(
                "request timed out after 1s".to_string()
            ))
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let generator = OpenAiGenerator::from_config(&config("http://localhost:8080/v1/")).unwrap();
        assert_eq!(generator.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn parse_answer_takes_first_choice() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": " At the start of each half. "}}]}"#,
        )
        .unwrap();

        assert_eq!(parse_answer(body).unwrap(), "At the start of each half.");
    }

    #[test]
    fn parse_answer_rejects_empty_choices() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parse_answer(body).is_err());
    }
}
