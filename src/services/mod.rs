//! External AI service boundary: summarization and embedding.
//!
//! Clients here are single-shot; retry and backoff are owned by the pipeline
//! so that the attempt budget is accounted in exactly one place.

mod embedder;
mod summarizer;

pub use embedder::OpenAiEmbedder;
pub use summarizer::ChatSummarizer;

use std::fmt;

use reqwest::StatusCode;

use crate::documents::Document;

/// Failure of one summarization or embedding call.
#[derive(Debug)]
pub enum ServiceError {
    /// The service returned a non-success status.
    Status {
        /// HTTP status code of the response.
        status: StatusCode,
        /// Response body, kept for rate-limit detection and diagnostics.
        body: String,
    },
    /// Transport-level failure before a response arrived.
    Transport(reqwest::Error),
    /// The response payload did not match the expected shape.
    Payload(String),
}

impl ServiceError {
    /// Whether the failure signals upstream rate limiting: HTTP 429 or a
    /// body mentioning a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Status { status, body } => {
                *status == StatusCode::TOO_MANY_REQUESTS || body.contains("rate limit")
            }
            Self::Transport(_) | Self::Payload(_) => false,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "service returned {status}: {body}"),
            Self::Transport(err) => write!(f, "service request failed: {err}"),
            Self::Payload(message) => write!(f, "unexpected service payload: {message}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Status { .. } | Self::Payload(_) => None,
        }
    }
}

/// Produces a natural-language summary for one document.
#[allow(async_fn_in_trait)]
pub trait SummaryService {
    /// Summarizes the document's content.
    async fn summarize(&self, document: &Document) -> Result<String, ServiceError>;
}

/// Produces an embedding vector for one text.
#[allow(async_fn_in_trait)]
pub trait EmbeddingService {
    /// Embeds the provided text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}
