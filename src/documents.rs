//! Record types flowing between ingestion pipeline stages.

use serde::{Deserialize, Serialize};

/// A single file's path and content as retrieved from the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Repository-relative file path.
    pub path: String,
    /// Full file content.
    pub content: String,
}

impl Document {
    /// Creates a document from the provided components.
    pub fn new<P, C>(path: P, content: C) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Summary produced for one document that succeeded within its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Repository-relative path of the summarized file.
    pub file_name: String,
    /// Natural-language summary emitted by the summarization service.
    pub summary: String,
    /// Original file content, carried through for persistence.
    pub source_code: String,
}

impl SummaryRecord {
    /// Derives a summary record from a document plus the service output.
    pub fn from_document(document: &Document, summary: String) -> Self {
        Self {
            file_name: document.path.clone(),
            summary,
            source_code: document.content.clone(),
        }
    }
}

/// A summary record paired with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Repository-relative path of the summarized file.
    pub file_name: String,
    /// Natural-language summary the vector was computed from.
    pub summary: String,
    /// Original file content, carried through for persistence.
    pub source_code: String,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    /// Pairs a summary record with the vector produced for it.
    pub fn from_summary(record: SummaryRecord, embedding: Vec<f32>) -> Self {
        Self {
            file_name: record.file_name,
            summary: record.summary,
            source_code: record.source_code,
            embedding,
        }
    }
}
