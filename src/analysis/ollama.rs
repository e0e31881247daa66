//! Ollama chat backend for analysis tasks.
//!
//! Sends the task's system prompt and the input as a two-message chat to
//! `/api/chat`. Structured tasks pass their JSON schema in the `format` field
//! and the reply content is parsed as JSON.

use super::{AnalysisOutput, AnalysisTask, TaskInput};
use crate::errors::AnalysisError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Extra attempts after a transient failure.
    pub retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub backoff: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 300,
            retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl OllamaConfig {
    /// Worst-case time for one `invoke`: every attempt timing out, plus the
    /// backoff sleeps between them and a second of slack.
    pub fn call_budget(&self) -> Duration {
        let per_attempt = Duration::from_secs(self.timeout_seconds);
        let mut budget = per_attempt.saturating_add(Duration::from_secs(1));
        let mut delay = self.backoff;
        for _ in 0..self.retries {
            budget = budget.saturating_add(per_attempt).saturating_add(delay);
            delay = delay.saturating_mul(2);
        }
        budget
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// AnalysisTask backed by a local or remote Ollama server.
pub struct OllamaAnalysis {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaAnalysis {
    pub fn new(config: OllamaConfig) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AnalysisError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn build_request(&self, input: &TaskInput) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: input.task.system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: input.input.clone(),
                },
            ],
            format: input.schema.map(|schema| schema.json_schema()),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        }
    }

    async fn send_once(&self, request: &OllamaChatRequest) -> Result<String, AnalysisError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Unavailable(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    AnalysisError::Unavailable(format!(
                        "cannot connect to Ollama at {}",
                        self.config.ollama_url
                    ))
                } else {
                    AnalysisError::Unavailable(format!("failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(format!("failed to parse Ollama response: {}", e)))?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl AnalysisTask for OllamaAnalysis {
    async fn invoke(&self, input: TaskInput) -> Result<AnalysisOutput, AnalysisError> {
        let request = self.build_request(&input);
        let mut delay = self.config.backoff;
        let mut attempt = 0;

        let content = loop {
            match self.send_once(&request).await {
                Ok(content) => break content,
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retrying in {:?} ({}/{})",
                        input.task, e, delay, attempt, self.config.retries
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        };

        debug!("{} returned {} chars", input.task, content.len());
        parse_content(content, input.schema.is_some())
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

fn status_error(status: StatusCode, body: &str) -> AnalysisError {
    let message = format!("Ollama API error {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        AnalysisError::RateLimited(message)
    } else {
        AnalysisError::Unavailable(message)
    }
}

/// Turn reply content into an output, parsing JSON for structured tasks.
fn parse_content(content: String, structured: bool) -> Result<AnalysisOutput, AnalysisError> {
    if !structured {
        return Ok(AnalysisOutput::Text(content));
    }

    let trimmed = strip_code_fence(&content);
    serde_json::from_str(trimmed)
        .map(AnalysisOutput::Structured)
        .map_err(|e| AnalysisError::InvalidResponse(format!("reply is not valid JSON: {}", e)))
}

/// Models sometimes wrap JSON in a Markdown fence despite the format hint.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
