//! Core data models for corpora, files, conversations, and retrieval.
//!
//! Timestamps are stored as Unix epoch seconds (i64) and formatted as
//! ISO-8601 only at the request/response boundary.

use serde::{Deserialize, Serialize};

/// A named document collection with its own model and retrieval settings.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// System prompt prepended to every conversation turn.
    pub default_prompt: String,
    pub embedding_model: String,
    pub completion_model: String,
    /// Minimum cosine similarity for a retrieved chunk to be used as context.
    pub similarity_threshold: f64,
    /// Directory scanned for documents.
    pub path: String,
    /// Name of the corpus's collection in the vector store.
    pub collection_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A file discovered under a corpus's path.
///
/// `is_ingested` flips false → true exactly once, after the file's vectors
/// are durably stored; it never flips back automatically.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub id: String,
    pub corpus_id: String,
    pub filename: String,
    pub is_ingested: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A contiguous token span of a file's text, ready for embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub token_count: usize,
    pub hash: String,
}

/// A chunk that survived retrieval, with its similarity and provenance.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f64,
    pub file_id: String,
    pub filename: String,
    pub chunk_index: i64,
}

/// Attribution entry on a conversation part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_id: String,
    pub filename: String,
}

/// A conversation scoped to one corpus.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub corpus_id: String,
    pub title: Option<String>,
    pub created_at: i64,
}

/// One query/response exchange, immutable once created.
///
/// The model identifiers are the ones actually used for this turn; later
/// corpus configuration changes do not rewrite history.
#[derive(Debug, Clone)]
pub struct ConversationPart {
    pub id: String,
    pub conversation_id: String,
    pub part_index: i64,
    pub query: String,
    pub response: String,
    pub context_chunks: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub chunks_retrieved: i64,
    pub embedding_model_used: String,
    pub completion_model_used: String,
    pub created_at: i64,
}

/// Format an epoch-second timestamp as ISO-8601 for boundary responses.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
