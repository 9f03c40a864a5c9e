//! Engine-level tests over in-memory SQLite and mock provider adapters.
//!
//! The mocks implement the same traits the production adapters do, so the
//! pipeline, retrieval engine, and conversation orchestrator run unchanged
//! with no network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use ragmill::completion::{ChatMessage, Completer};
use ragmill::config::{ChunkingConfig, IngestionConfig};
use ragmill::conversation::{self, ContinueConversation, StartConversation};
use ragmill::corpus::{self, CreateCorpus, UpdateCorpus};
use ragmill::cost;
use ragmill::embedding::Embedder;
use ragmill::engine::Engine;
use ragmill::error::{Error, ProviderErrorKind, Result};
use ragmill::ingest;
use ragmill::migrate;
use ragmill::vector_store::{ChunkPayload, ScoredChunk, VectorIndex, VectorRecord};

// ============ Mock adapters ============

/// Deterministic embedder: every text maps to the same unit vector, so all
/// stored chunks score 1.0 against ordinary queries. Texts containing
/// `UNRELATED` map to an orthogonal vector (score 0.0), and texts
/// containing `FAILPLEASE` make the call fail.
struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "text-embedding-3-small"
    }

    fn dims(&self) -> usize {
        4
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if text.contains("FAILPLEASE") {
                return Err(Error::provider(
                    ProviderErrorKind::Transient,
                    "mock embedding failure",
                ));
            }
            if text.contains("UNRELATED") {
                out.push(vec![0.0, 1.0, 0.0, 0.0]);
            } else {
                out.push(vec![1.0, 0.0, 0.0, 0.0]);
            }
        }
        Ok(out)
    }
}

/// Canned completer. Queries containing `FAIL_COMPLETION` time out.
struct MockCompleter;

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String> {
        let last = messages.last().expect("prompt has messages");
        if last.content.contains("FAIL_COMPLETION") {
            return Err(Error::provider(
                ProviderErrorKind::Transient,
                "mock completion timeout",
            ));
        }
        if last.content.contains("SLOW") {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        Ok(format!("grounded answer to: {}", last.content))
    }
}

/// Brute-force in-memory vector index. Points live in insertion order;
/// upsert replaces by id; search is cosine similarity over everything.
#[derive(Default)]
struct MockVectorIndex {
    collections: Mutex<HashMap<String, Vec<(Uuid, Vec<f32>, ChunkPayload)>>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < f32::EPSILON || nb < f32::EPSILON {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn ensure_collection(&self, collection: &str, _dims: usize) -> Result<()> {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_by_file(&self, collection: &str, file_id: &str) -> Result<()> {
        if let Some(points) = self.collections.lock().unwrap().get_mut(collection) {
            points.retain(|(_, _, payload)| payload.file_id != file_id);
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let points = collections.entry(collection.to_string()).or_default();
        for record in records {
            points.retain(|(id, _, _)| *id != record.id);
            points.push((record.id, record.vector.clone(), record.payload.clone()));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.lock().unwrap();
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredChunk> = points
            .iter()
            .map(|(_, v, payload)| ScoredChunk {
                score: cosine(vector, v),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collections.lock().unwrap().remove(collection);
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|p| p.len() as u64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============ Harness ============

struct Harness {
    engine: Engine,
    vectors: Arc<MockVectorIndex>,
    docs: TempDir,
}

async fn test_pool(dir: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        dir.path().join("ragmill-test.sqlite").display()
    ))
    .unwrap()
    .create_if_missing(true)
    .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .unwrap()
}

async fn harness() -> Harness {
    let docs = TempDir::new().unwrap();
    let pool = test_pool(&docs).await;
    migrate::run(&pool).await.unwrap();

    let vectors = Arc::new(MockVectorIndex::default());
    let engine = Engine::with_components(
        pool,
        Arc::new(MockEmbedder),
        Arc::new(MockCompleter),
        vectors.clone(),
        ChunkingConfig {
            chunk_tokens: 64,
            overlap_tokens: 8,
        },
        IngestionConfig {
            batch_size: 2,
            max_concurrent_files: 2,
        },
    );

    Harness {
        engine,
        vectors,
        docs,
    }
}

impl Harness {
    fn write_doc(&self, name: &str, content: &str) {
        std::fs::write(self.docs.path().join(name), content).unwrap();
    }

    async fn create_corpus(&self, name: &str) -> ragmill::models::Corpus {
        corpus::create_corpus(
            self.engine.pool(),
            CreateCorpus {
                name: name.to_string(),
                description: None,
                default_prompt: "Answer using only the provided context.".to_string(),
                embedding_model: None,
                completion_model: None,
                similarity_threshold: Some(0.7),
                path: self.docs.path().to_string_lossy().to_string(),
                collection_name: None,
            },
        )
        .await
        .unwrap()
    }
}

fn assert_not_found(result: std::result::Result<impl std::fmt::Debug, Error>) {
    match result {
        Err(Error::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

// ============ Scan + cost estimation ============

#[tokio::test]
async fn test_scan_discovers_txt_files_once() {
    let h = harness().await;
    h.write_doc("alpha.txt", "Alpha document about Rust programming.");
    h.write_doc("beta.txt", "Beta document about deployments.");
    h.write_doc("notes.md", "Markdown is not scanned.");
    let c = h.create_corpus("docs").await;

    let added = corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(added[0].filename, "alpha.txt");
    assert!(added.iter().all(|f| !f.is_ingested));

    // Second scan adds nothing new.
    let again = corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();
    assert!(again.is_empty());

    let files = corpus::list_files(h.engine.pool(), &c.id).await.unwrap();
    assert_eq!(files.len(), 2);
}

#[tokio::test]
async fn test_cost_estimate_totals_are_additive() {
    let h = harness().await;
    h.write_doc("alpha.txt", &"alpha tokens here. ".repeat(40));
    h.write_doc("beta.txt", &"beta tokens over there. ".repeat(25));
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();

    let summary = cost::estimate_corpus_cost(h.engine.pool(), &c.id, false)
        .await
        .unwrap();

    assert_eq!(summary.file_count, 2);
    assert_eq!(summary.uningested_count, 2);
    assert_eq!(summary.ingested_count, 0);
    assert!(summary.files.iter().all(|f| f.tokens > 0));

    let token_sum: u64 = summary.files.iter().map(|f| f.tokens).sum();
    let cost_sum: f64 = summary.files.iter().map(|f| f.cost).sum();
    assert_eq!(summary.total_tokens, token_sum);
    assert!((summary.total_cost - cost_sum).abs() < 1e-9);

    // 0.00002 USD per 1K tokens for the default model.
    let expected = token_sum as f64 * 0.00002 / 1000.0;
    assert!((summary.total_cost - expected).abs() < 1e-12);
}

#[tokio::test]
async fn test_cost_estimate_reports_unreadable_file_per_row() {
    let h = harness().await;
    h.write_doc("alpha.txt", "readable content");
    h.write_doc("gone.txt", "about to vanish");
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();

    std::fs::remove_file(h.docs.path().join("gone.txt")).unwrap();

    let summary = cost::estimate_corpus_cost(h.engine.pool(), &c.id, false)
        .await
        .unwrap();

    assert_eq!(summary.files.len(), 2);
    let gone = summary.files.iter().find(|f| f.filename == "gone.txt").unwrap();
    assert!(gone.error.is_some());
    assert_eq!(gone.tokens, 0);

    let alpha = summary.files.iter().find(|f| f.filename == "alpha.txt").unwrap();
    assert!(alpha.error.is_none());
    assert_eq!(summary.total_tokens, alpha.tokens);
}

#[tokio::test]
async fn test_cost_estimate_missing_corpus_is_not_found() {
    let h = harness().await;
    assert_not_found(cost::estimate_corpus_cost(h.engine.pool(), "no-such-corpus", false).await);
}

// ============ Ingestion ============

#[tokio::test]
async fn test_ingest_marks_files_and_stores_vectors() {
    let h = harness().await;
    h.write_doc("alpha.txt", "Alpha document about Rust programming.");
    h.write_doc("beta.txt", &"Beta document with enough words to span multiple chunks. ".repeat(20));
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();

    let report = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert!(report.files.iter().all(|f| f.success));

    let chunk_sum: usize = report.files.iter().map(|f| f.chunks).sum();
    assert!(chunk_sum >= 2);
    assert_eq!(
        h.vectors.count(&c.collection_name).await.unwrap(),
        chunk_sum as u64
    );

    let files = corpus::list_files(h.engine.pool(), &c.id).await.unwrap();
    assert!(files.iter().all(|f| f.is_ingested));
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let h = harness().await;
    h.write_doc("alpha.txt", "Alpha document about Rust programming.");
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();

    let first = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert_eq!(first.succeeded, 1);
    let count_after_first = h.vectors.count(&c.collection_name).await.unwrap();

    // Already-ingested files are untouched: empty report, same vectors.
    let second = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert!(second.files.is_empty());
    assert_eq!(
        h.vectors.count(&c.collection_name).await.unwrap(),
        count_after_first
    );
}

#[tokio::test]
async fn test_ingest_failure_isolated_per_file() {
    let h = harness().await;
    h.write_doc("alpha.txt", "A perfectly fine document.");
    h.write_doc("beta.txt", "This one contains FAILPLEASE so embedding dies.");
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();

    let report = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    let alpha = report.files.iter().find(|f| f.filename == "alpha.txt").unwrap();
    let beta = report.files.iter().find(|f| f.filename == "beta.txt").unwrap();
    assert!(alpha.success);
    assert!(!beta.success);
    assert!(beta.error.is_some());

    let files = corpus::list_files(h.engine.pool(), &c.id).await.unwrap();
    let alpha_row = files.iter().find(|f| f.filename == "alpha.txt").unwrap();
    let beta_row = files.iter().find(|f| f.filename == "beta.txt").unwrap();
    assert!(alpha_row.is_ingested);
    assert!(!beta_row.is_ingested);

    // A retry reprocesses only the failed file.
    let retry = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert_eq!(retry.files.len(), 1);
    assert_eq!(retry.files[0].filename, "beta.txt");
}

#[tokio::test]
async fn test_ingest_empty_file_reported_and_not_retried() {
    let h = harness().await;
    h.write_doc("empty.txt", "");
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();

    let report = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.files[0].chunks, 0);
    assert_eq!(h.vectors.count(&c.collection_name).await.unwrap(), 0);

    let second = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert!(second.files.is_empty());
}

#[tokio::test]
async fn test_ingest_missing_corpus_is_not_found() {
    let h = harness().await;
    assert_not_found(ingest::ingest_corpus(&h.engine, "no-such-corpus").await);
}

// ============ Corpus configuration ============

#[tokio::test]
async fn test_embedding_model_frozen_after_ingestion() {
    let h = harness().await;
    h.write_doc("alpha.txt", "Some content.");
    let c = h.create_corpus("docs").await;

    // Before any ingestion the model may change freely.
    let updated = corpus::update_corpus(
        h.engine.pool(),
        &c.id,
        UpdateCorpus {
            embedding_model: Some("text-embedding-3-large".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.embedding_model, "text-embedding-3-large");

    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();
    ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();

    let result = corpus::update_corpus(
        h.engine.pool(),
        &c.id,
        UpdateCorpus {
            embedding_model: Some("text-embedding-3-small".to_string()),
            ..Default::default()
        },
    )
    .await;
    match result {
        Err(Error::Validation(msg)) => assert!(msg.contains("embedding model")),
        other => panic!("expected Validation, got {other:?}"),
    }

    // Other fields stay editable.
    let renamed = corpus::update_corpus(
        h.engine.pool(),
        &c.id,
        UpdateCorpus {
            similarity_threshold: Some(0.5),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!((renamed.similarity_threshold - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_duplicate_corpus_name_rejected() {
    let h = harness().await;
    h.create_corpus("docs").await;

    let result = corpus::create_corpus(
        h.engine.pool(),
        CreateCorpus {
            name: "docs".to_string(),
            description: None,
            default_prompt: "p".to_string(),
            embedding_model: None,
            completion_model: None,
            similarity_threshold: None,
            path: "/tmp".to_string(),
            collection_name: None,
        },
    )
    .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

// ============ Conversations ============

async fn ingested_corpus(h: &Harness) -> ragmill::models::Corpus {
    h.write_doc(
        "policy.txt",
        "Refunds are processed within thirty days of the request.",
    );
    let c = h.create_corpus("docs").await;
    corpus::scan_corpus_files(h.engine.pool(), &c.id).await.unwrap();
    let report = ingest::ingest_corpus(&h.engine, &c.id).await.unwrap();
    assert_eq!(report.failed, 0);
    c
}

#[tokio::test]
async fn test_start_conversation_grounds_answer_in_context() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let response = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "What is the refund policy?".to_string(),
            title: Some("refunds".to_string()),
            limit: Some(3),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.title.as_deref(), Some("refunds"));
    assert_eq!(response.parts.len(), 1);

    let part = &response.parts[0];
    assert_eq!(part.part_index, 0);
    assert!(part.chunks_retrieved > 0);
    assert_eq!(part.context_chunks.len(), part.chunks_retrieved as usize);
    assert_eq!(part.sources[0].filename, "policy.txt");
    assert_eq!(part.embedding_model_used, "text-embedding-3-small");
    assert_eq!(part.completion_model_used, "gpt-4o-mini");
    assert!(part.response.contains("refund policy"));
}

#[tokio::test]
async fn test_empty_context_is_an_answer_not_an_error() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    // The mock embeds UNRELATED queries orthogonally to every stored chunk,
    // so nothing clears the 0.7 threshold.
    let response = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "UNRELATED question about gardening".to_string(),
            title: None,
            limit: Some(3),
        },
    )
    .await
    .unwrap();

    let part = &response.parts[0];
    assert_eq!(part.chunks_retrieved, 0);
    assert!(part.context_chunks.is_empty());
    assert!(part.sources.is_empty());
    assert!(!part.response.is_empty());
}

#[tokio::test]
async fn test_continue_appends_exactly_one_ordered_part() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let started = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "first question".to_string(),
            title: None,
            limit: None,
        },
    )
    .await
    .unwrap();

    for query in ["second question", "third question"] {
        conversation::continue_conversation(
            &h.engine,
            &started.id,
            ContinueConversation {
                query: query.to_string(),
                limit: None,
            },
        )
        .await
        .unwrap();
    }

    let full = conversation::get_conversation(h.engine.pool(), &started.id)
        .await
        .unwrap();
    assert_eq!(full.parts.len(), 3);
    for (i, part) in full.parts.iter().enumerate() {
        assert_eq!(part.part_index, i as i64);
    }
    assert_eq!(full.parts[1].query, "second question");
    assert_eq!(full.parts[2].query, "third question");
}

#[tokio::test]
async fn test_completion_failure_persists_no_part() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let started = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "first question".to_string(),
            title: None,
            limit: None,
        },
    )
    .await
    .unwrap();
    conversation::continue_conversation(
        &h.engine,
        &started.id,
        ContinueConversation {
            query: "second question".to_string(),
            limit: None,
        },
    )
    .await
    .unwrap();

    let result = conversation::continue_conversation(
        &h.engine,
        &started.id,
        ContinueConversation {
            query: "please FAIL_COMPLETION now".to_string(),
            limit: None,
        },
    )
    .await;
    assert!(matches!(result, Err(Error::Provider { .. })));

    let full = conversation::get_conversation(h.engine.pool(), &started.id)
        .await
        .unwrap();
    assert_eq!(full.parts.len(), 2);
}

#[tokio::test]
async fn test_failed_start_leaves_no_conversation() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let result = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "FAIL_COMPLETION immediately".to_string(),
            title: None,
            limit: None,
        },
    )
    .await;
    assert!(result.is_err());

    let summaries = conversation::list_conversations(h.engine.pool(), &c.id)
        .await
        .unwrap();
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn test_concurrent_turns_on_one_conversation_reject_second() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let started = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "first question".to_string(),
            title: None,
            limit: None,
        },
    )
    .await
    .unwrap();

    let a = conversation::continue_conversation(
        &h.engine,
        &started.id,
        ContinueConversation {
            query: "SLOW follow-up one".to_string(),
            limit: None,
        },
    );
    let b = conversation::continue_conversation(
        &h.engine,
        &started.id,
        ContinueConversation {
            query: "SLOW follow-up two".to_string(),
            limit: None,
        },
    );

    let (ra, rb) = tokio::join!(a, b);
    let busy_count = [&ra, &rb]
        .iter()
        .filter(|r| matches!(r, Err(Error::Busy(_))))
        .count();
    let ok_count = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(busy_count, 1, "exactly one turn must be rejected");
    assert_eq!(ok_count, 1, "exactly one turn must commit");

    let full = conversation::get_conversation(h.engine.pool(), &started.id)
        .await
        .unwrap();
    assert_eq!(full.parts.len(), 2);
}

#[tokio::test]
async fn test_query_validation_rejected_before_any_call() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let empty_query = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "   ".to_string(),
            title: None,
            limit: None,
        },
    )
    .await;
    assert!(matches!(empty_query, Err(Error::Validation(_))));

    let zero_limit = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "a question".to_string(),
            title: None,
            limit: Some(0),
        },
    )
    .await;
    assert!(matches!(zero_limit, Err(Error::Validation(_))));
}

// ============ Cascade delete ============

#[tokio::test]
async fn test_delete_corpus_cascades_everywhere() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let started = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "first question".to_string(),
            title: None,
            limit: None,
        },
    )
    .await
    .unwrap();

    assert!(h.vectors.count(&c.collection_name).await.unwrap() > 0);

    let deleted = corpus::delete_corpus(&h.engine, &c.id).await.unwrap();
    assert!(deleted);

    assert_not_found(corpus::get_corpus(h.engine.pool(), &c.id).await);
    assert_not_found(conversation::get_conversation(h.engine.pool(), &started.id).await);

    let file_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM corpus_files WHERE corpus_id = ?")
        .bind(&c.id)
        .fetch_one(h.engine.pool())
        .await
        .unwrap();
    assert_eq!(file_rows, 0);

    let part_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation_parts")
        .fetch_one(h.engine.pool())
        .await
        .unwrap();
    assert_eq!(part_rows, 0);

    assert_eq!(h.vectors.count(&c.collection_name).await.unwrap(), 0);

    // Idempotent: deleting again is not an error.
    assert!(!corpus::delete_corpus(&h.engine, &c.id).await.unwrap());
}

#[tokio::test]
async fn test_delete_conversation_requires_existing() {
    let h = harness().await;
    let c = ingested_corpus(&h).await;

    let started = conversation::start_conversation(
        &h.engine,
        &c.id,
        StartConversation {
            query: "first question".to_string(),
            title: None,
            limit: None,
        },
    )
    .await
    .unwrap();

    conversation::delete_conversation(&h.engine, &started.id)
        .await
        .unwrap();
    assert_not_found(conversation::get_conversation(h.engine.pool(), &started.id).await);
    assert_not_found(conversation::delete_conversation(&h.engine, &started.id).await);
}
