//! Chat-completions client that produces file summaries.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ServiceError, SummaryService};
use crate::documents::Document;

const SYSTEM_PROMPT: &str = "You are onboarding a junior engineer onto an unfamiliar codebase. \
Summarize what the given source file does in no more than 100 words, plainly and concretely.";
/// Characters of file content forwarded to the model per request.
const MAX_CONTENT_CHARS: usize = 10000;
const MAX_COMPLETION_TOKENS: usize = 256;
const TEMPERATURE: f32 = 0.2;

/// OpenAI-compatible chat client that summarizes one document per call.
pub struct ChatSummarizer {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatSummarizer {
    /// Builds a new summarization client.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing summarization API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing summarization model name");
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid summarization API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build summarization HTTP client")?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
        })
    }

    fn prompt_for(document: &Document) -> String {
        let content: String = document.content.chars().take(MAX_CONTENT_CHARS).collect();
        format!(
            "Summarize the purpose of `{}`:\n\n{}",
            document.path, content
        )
    }
}

impl SummaryService for ChatSummarizer {
    async fn summarize(&self, document: &Document) -> Result<String, ServiceError> {
        let prompt = Self::prompt_for(document);
        let request = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            max_tokens: MAX_COMPLETION_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ServiceError::Status { status, body });
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Payload(err.to_string()))?;
        let summary = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if summary.is_empty() {
            return Err(ServiceError::Payload(
                "chat response missing content".to_string(),
            ));
        }
        Ok(summary)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_truncates_oversized_content() {
        let document = Document::new("big.ts", "x".repeat(MAX_CONTENT_CHARS * 2));
        let prompt = ChatSummarizer::prompt_for(&document);
        assert!(prompt.chars().count() < MAX_CONTENT_CHARS + 100);
        assert!(prompt.contains("big.ts"));
    }

    #[test]
    fn prompt_keeps_short_content_whole() {
        let document = Document::new("small.ts", "export const a = 1;");
        let prompt = ChatSummarizer::prompt_for(&document);
        assert!(prompt.contains("export const a = 1;"));
    }
}
