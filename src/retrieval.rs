//! Retrieval engine.
//!
//! Embeds a query with the corpus's embedding model, asks the vector store
//! for the nearest chunks, and keeps only those at or above the corpus's
//! similarity threshold. An empty survivor set is not an error; it means
//! the conversation orchestrator answers from no context.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{Corpus, RetrievedChunk};
use crate::vector_store::{ScoredChunk, VectorIndex};

/// Retrieve up to `limit` context chunks for `query` against `corpus`.
///
/// Results come back ordered by descending similarity; equal scores keep
/// the store's insertion order (filename, then chunk index), which makes
/// repeated queries reproducible.
pub async fn retrieve_context(
    embedder: &dyn Embedder,
    vectors: &Arc<dyn VectorIndex>,
    corpus: &Corpus,
    query: &str,
    limit: u64,
) -> Result<Vec<RetrievedChunk>> {
    if query.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }
    if limit == 0 {
        return Err(Error::validation("result limit must be >= 1"));
    }

    let query_vec = embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::provider(
                crate::error::ProviderErrorKind::InvalidRequest,
                "empty embedding response for query",
            )
        })?;

    let hits = vectors
        .search(&corpus.collection_name, &query_vec, limit)
        .await?;

    Ok(apply_threshold(hits, corpus.similarity_threshold))
}

/// Drop hits below `threshold` and order the survivors.
///
/// Separated from the store call so the threshold semantics are testable
/// without a live vector store.
fn apply_threshold(hits: Vec<ScoredChunk>, threshold: f64) -> Vec<RetrievedChunk> {
    let mut kept: Vec<RetrievedChunk> = hits
        .into_iter()
        .filter(|h| h.score >= threshold)
        .map(|h| RetrievedChunk {
            text: h.payload.text,
            score: h.score,
            file_id: h.payload.file_id,
            filename: h.payload.filename,
            chunk_index: h.payload.chunk_index,
        })
        .collect();

    // Stable sort: ties keep their incoming (insertion) order.
    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    kept
}
