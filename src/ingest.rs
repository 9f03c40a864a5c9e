//! Ingestion pipeline orchestration.
//!
//! Processes every un-ingested file of a corpus: read → chunk → batched
//! embedding calls → vector upsert → mark ingested. Files are independent
//! units of work:
//!
//! - a failure in one file never aborts the others; the pipeline returns an
//!   aggregate report with one outcome row per file;
//! - a file is marked ingested only after its vectors are durably stored,
//!   so a partial failure leaves it eligible for retry;
//! - point ids are deterministic and the file's stale points are deleted
//!   before upsert, so retries overwrite instead of duplicating.
//!
//! A per-corpus lock serializes whole pipeline runs; within a run, files
//! are processed concurrently up to `ingestion.max_concurrent_files`.

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::chunk::Chunker;
use crate::corpus;
use crate::embedding::Embedder;
use crate::engine::Engine;
use crate::error::{Error, ProviderErrorKind, Result};
use crate::models::{Corpus, CorpusFile};
use crate::vector_store::{point_id, ChunkPayload, VectorIndex, VectorRecord};

/// Outcome of one file's ingestion attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FileIngestOutcome {
    pub file_id: String,
    pub filename: String,
    pub success: bool,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate pipeline report. Partial failure is a normal response; the
/// caller inspects the rows.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub corpus_id: String,
    pub files: Vec<FileIngestOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

pub async fn ingest_corpus(engine: &Engine, corpus_id: &str) -> Result<IngestReport> {
    // NotFound surfaces before any lock or external call.
    corpus::get_corpus(&engine.pool, corpus_id).await?;

    let _run_guard = engine.ingest_locks.acquire(corpus_id).await;

    // Re-read under the lock: a concurrent run may have finished files.
    let corpus = corpus::get_corpus(&engine.pool, corpus_id).await?;
    let pending: Vec<CorpusFile> = corpus::list_files(&engine.pool, corpus_id)
        .await?
        .into_iter()
        .filter(|f| !f.is_ingested)
        .collect();

    if pending.is_empty() {
        return Ok(IngestReport {
            corpus_id: corpus.id,
            files: Vec::new(),
            succeeded: 0,
            failed: 0,
        });
    }

    let embedder = engine.embedder_for(&corpus.embedding_model)?;
    engine
        .vectors
        .ensure_collection(&corpus.collection_name, embedder.dims())
        .await?;

    let chunker = Arc::new(Chunker::new(
        &corpus.embedding_model,
        engine.chunking.chunk_tokens,
        engine.chunking.overlap_tokens,
    )?);

    info!(
        corpus = %corpus.name,
        files = pending.len(),
        "starting ingestion run"
    );

    let semaphore = Arc::new(Semaphore::new(engine.ingestion.max_concurrent_files));
    let mut handles = Vec::with_capacity(pending.len());

    for file in pending {
        let semaphore = semaphore.clone();
        let pool = engine.pool.clone();
        let embedder = embedder.clone();
        let vectors = engine.vectors.clone();
        let chunker = chunker.clone();
        let corpus = corpus.clone();
        let batch_size = engine.ingestion.batch_size;

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            process_file(&pool, embedder, vectors, &chunker, &corpus, &file, batch_size).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => return Err(Error::store(format!("ingestion task failed: {e}"), false)),
        }
    }
    outcomes.sort_by(|a, b| a.filename.cmp(&b.filename));

    let succeeded = outcomes.iter().filter(|o| o.success).count();
    let failed = outcomes.len() - succeeded;

    info!(
        corpus = %corpus.name,
        succeeded,
        failed,
        "ingestion run finished"
    );

    Ok(IngestReport {
        corpus_id: corpus.id,
        files: outcomes,
        succeeded,
        failed,
    })
}

/// Run one file through the pipeline, converting any failure into an
/// outcome row instead of propagating it.
async fn process_file(
    pool: &SqlitePool,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    chunker: &Chunker,
    corpus: &Corpus,
    file: &CorpusFile,
    batch_size: usize,
) -> FileIngestOutcome {
    match ingest_file(pool, embedder, vectors, chunker, corpus, file, batch_size).await {
        Ok(chunks) => FileIngestOutcome {
            file_id: file.id.clone(),
            filename: file.filename.clone(),
            success: true,
            chunks,
            error: None,
        },
        Err(e) => {
            warn!(file = %file.filename, error = %e, "file ingestion failed");
            FileIngestOutcome {
                file_id: file.id.clone(),
                filename: file.filename.clone(),
                success: false,
                chunks: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn ingest_file(
    pool: &SqlitePool,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorIndex>,
    chunker: &Chunker,
    corpus: &Corpus,
    file: &CorpusFile,
    batch_size: usize,
) -> Result<usize> {
    let path = std::path::Path::new(&corpus.path).join(&file.filename);
    let text = tokio::fs::read_to_string(&path).await?;

    let chunks = chunker.chunk(&file.id, &text)?;

    // Empty files produce no vectors; mark them ingested so reruns stay
    // no-ops, and let the zero chunk count report the skip.
    if chunks.is_empty() {
        mark_ingested(pool, &file.id).await?;
        return Ok(0);
    }

    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;

        if embeddings.len() != batch.len() {
            return Err(Error::provider(
                ProviderErrorKind::InvalidRequest,
                format!(
                    "provider returned {} embeddings for {} inputs",
                    embeddings.len(),
                    batch.len()
                ),
            ));
        }

        for (chunk, vector) in batch.iter().zip(embeddings) {
            records.push(VectorRecord {
                id: point_id(&corpus.id, &file.id, chunk.chunk_index),
                vector,
                payload: ChunkPayload {
                    corpus_id: corpus.id.clone(),
                    file_id: file.id.clone(),
                    filename: file.filename.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    hash: chunk.hash.clone(),
                },
            });
        }
    }

    // Replace, don't append: clear the file's stale points first so a file
    // that shrank since a failed attempt leaves no orphans behind.
    vectors
        .delete_by_file(&corpus.collection_name, &file.id)
        .await?;
    vectors.upsert(&corpus.collection_name, &records).await?;

    // Only after the vectors are durably stored.
    mark_ingested(pool, &file.id).await?;

    Ok(records.len())
}

async fn mark_ingested(pool: &SqlitePool, file_id: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE corpus_files SET is_ingested = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}
