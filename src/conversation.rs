//! Conversation orchestrator.
//!
//! Two entry points, one shared turn procedure:
//!
//! - [`start_conversation`] — create a conversation and run its first turn;
//! - [`continue_conversation`] — run another turn with the accumulated
//!   parts replayed as dialogue history.
//!
//! A turn retrieves context (which may legitimately be empty), assembles
//! the prompt from the corpus's default system prompt + history + context +
//! query, and calls the completion provider. The part records the model
//! identifiers actually used, so later corpus reconfiguration does not
//! rewrite history. On completion failure nothing is persisted.
//!
//! Turns within one conversation are serialized by a per-conversation
//! advisory lock; a second turn (or a delete) arriving while one is in
//! flight is rejected with `Busy`.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::completion::ChatMessage;
use crate::corpus;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::models::{format_ts_iso, Corpus, RetrievedChunk, SourceRef};
use crate::retrieval;

/// Retrieval result-count limit when the caller does not provide one.
pub const DEFAULT_RESULT_LIMIT: u64 = 5;

#[derive(Debug, Clone)]
pub struct StartConversation {
    pub query: String,
    pub title: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ContinueConversation {
    pub query: String,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub corpus_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub parts: Vec<ConversationPartResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationPartResponse {
    pub id: String,
    pub part_index: i64,
    pub query: String,
    pub response: String,
    pub context_chunks: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub chunks_retrieved: i64,
    pub embedding_model_used: String,
    pub completion_model_used: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub part_count: i64,
}

/// Everything a successful turn produced, ready to persist as a part.
struct TurnRecord {
    response: String,
    context_chunks: Vec<String>,
    sources: Vec<SourceRef>,
    chunks_retrieved: i64,
    embedding_model_used: String,
    completion_model_used: String,
}

pub async fn start_conversation(
    engine: &Engine,
    corpus_id: &str,
    req: StartConversation,
) -> Result<ConversationResponse> {
    let corpus = corpus::get_corpus(&engine.pool, corpus_id).await?;
    let limit = req.limit.unwrap_or(DEFAULT_RESULT_LIMIT);

    let turn = run_turn(engine, &corpus, &[], &req.query, limit).await?;

    // The conversation row is created only once the turn has succeeded; a
    // failed first turn leaves nothing behind.
    let conversation_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let mut tx = engine.pool.begin().await?;
    sqlx::query("INSERT INTO conversations (id, corpus_id, title, created_at) VALUES (?, ?, ?, ?)")
        .bind(&conversation_id)
        .bind(&corpus.id)
        .bind(&req.title)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    insert_part(&mut tx, &conversation_id, 0, &req.query, &turn, now).await?;
    tx.commit().await?;

    info!(conversation = %conversation_id, corpus = %corpus.name, "conversation started");

    get_conversation(&engine.pool, &conversation_id).await
}

pub async fn continue_conversation(
    engine: &Engine,
    conversation_id: &str,
    req: ContinueConversation,
) -> Result<ConversationResponse> {
    let (conversation_corpus_id, _) = conversation_header(&engine.pool, conversation_id).await?;

    // Serialize turns: the prompt depends on the full prior history, so a
    // second turn must not compose until this one commits or fails.
    let _turn_guard = engine
        .conversation_locks
        .try_acquire(conversation_id)
        .ok_or_else(|| Error::Busy(conversation_id.to_string()))?;

    let corpus = corpus::get_corpus(&engine.pool, &conversation_corpus_id).await?;
    let limit = req.limit.unwrap_or(DEFAULT_RESULT_LIMIT);

    let history = load_history(&engine.pool, conversation_id).await?;
    let next_index = history.len() as i64;

    let turn = run_turn(engine, &corpus, &history, &req.query, limit).await?;

    let now = chrono::Utc::now().timestamp();
    let mut tx = engine.pool.begin().await?;
    insert_part(&mut tx, conversation_id, next_index, &req.query, &turn, now).await?;
    tx.commit().await?;

    get_conversation(&engine.pool, conversation_id).await
}

/// Shared turn procedure: retrieve, assemble, complete.
async fn run_turn(
    engine: &Engine,
    corpus: &Corpus,
    history: &[(String, String)],
    query: &str,
    limit: u64,
) -> Result<TurnRecord> {
    let embedder = engine.embedder_for(&corpus.embedding_model)?;
    let context =
        retrieval::retrieve_context(embedder.as_ref(), &engine.vectors, corpus, query, limit)
            .await?;

    let messages = build_messages(&corpus.default_prompt, history, &context, query);
    let response = engine
        .completer
        .complete(&corpus.completion_model, &messages)
        .await?;

    Ok(TurnRecord {
        response,
        context_chunks: context.iter().map(|c| c.text.clone()).collect(),
        sources: distinct_sources(&context),
        chunks_retrieved: context.len() as i64,
        embedding_model_used: embedder.model_name().to_string(),
        completion_model_used: corpus.completion_model.clone(),
    })
}

/// Assemble the chat prompt for one turn.
///
/// System message carries the corpus prompt and the retrieved context (or
/// an explicit no-context note, so an empty retrieval still yields a
/// grounded, low-confidence answer). History replays in creation order.
fn build_messages(
    default_prompt: &str,
    history: &[(String, String)],
    context: &[RetrievedChunk],
    query: &str,
) -> Vec<ChatMessage> {
    let mut system = String::from(default_prompt);

    if context.is_empty() {
        system.push_str("\n\nNo relevant context was found in the corpus for this query.");
    } else {
        system.push_str("\n\nContext from the corpus:");
        for (i, chunk) in context.iter().enumerate() {
            system.push_str(&format!("\n\n[{}] ({})\n{}", i + 1, chunk.filename, chunk.text));
        }
    }

    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(system));
    for (past_query, past_response) in history {
        messages.push(ChatMessage::user(past_query.clone()));
        messages.push(ChatMessage::assistant(past_response.clone()));
    }
    messages.push(ChatMessage::user(query.to_string()));

    messages
}

/// Distinct source files in retrieval order.
fn distinct_sources(context: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for chunk in context {
        if seen.insert(chunk.file_id.clone()) {
            sources.push(SourceRef {
                file_id: chunk.file_id.clone(),
                filename: chunk.filename.clone(),
            });
        }
    }
    sources
}

async fn insert_part(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    conversation_id: &str,
    part_index: i64,
    query: &str,
    turn: &TurnRecord,
    now: i64,
) -> Result<()> {
    let context_json = serde_json::to_string(&turn.context_chunks)
        .map_err(|e| Error::validation(format!("failed to encode context chunks: {e}")))?;
    let sources_json = serde_json::to_string(&turn.sources)
        .map_err(|e| Error::validation(format!("failed to encode sources: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO conversation_parts
            (id, conversation_id, part_index, query, response, context_chunks, sources,
             chunks_retrieved, embedding_model_used, completion_model_used, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(conversation_id)
    .bind(part_index)
    .bind(query)
    .bind(&turn.response)
    .bind(&context_json)
    .bind(&sources_json)
    .bind(turn.chunks_retrieved)
    .bind(&turn.embedding_model_used)
    .bind(&turn.completion_model_used)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn conversation_header(pool: &SqlitePool, conversation_id: &str) -> Result<(String, i64)> {
    let row = sqlx::query("SELECT corpus_id, created_at FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| (r.get("corpus_id"), r.get("created_at")))
        .ok_or_else(|| Error::not_found("conversation", conversation_id))
}

/// Prior (query, response) pairs in creation order.
async fn load_history(pool: &SqlitePool, conversation_id: &str) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        "SELECT query, response FROM conversation_parts WHERE conversation_id = ? \
         ORDER BY created_at ASC, part_index ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| (r.get("query"), r.get("response")))
        .collect())
}

pub async fn get_conversation(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<ConversationResponse> {
    let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found("conversation", conversation_id))?;

    let part_rows = sqlx::query(
        "SELECT * FROM conversation_parts WHERE conversation_id = ? \
         ORDER BY created_at ASC, part_index ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    let parts = part_rows
        .iter()
        .map(|r| {
            let context_json: String = r.get("context_chunks");
            let sources_json: String = r.get("sources");
            ConversationPartResponse {
                id: r.get("id"),
                part_index: r.get("part_index"),
                query: r.get("query"),
                response: r.get("response"),
                context_chunks: serde_json::from_str(&context_json).unwrap_or_default(),
                sources: serde_json::from_str(&sources_json).unwrap_or_default(),
                chunks_retrieved: r.get("chunks_retrieved"),
                embedding_model_used: r.get("embedding_model_used"),
                completion_model_used: r.get("completion_model_used"),
                created_at: format_ts_iso(r.get("created_at")),
            }
        })
        .collect();

    Ok(ConversationResponse {
        id: row.get("id"),
        corpus_id: row.get("corpus_id"),
        title: row.get("title"),
        created_at: format_ts_iso(row.get("created_at")),
        parts,
    })
}

pub async fn list_conversations(
    pool: &SqlitePool,
    corpus_id: &str,
) -> Result<Vec<ConversationSummary>> {
    corpus::get_corpus(pool, corpus_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.title, c.created_at, COUNT(p.id) AS part_count
        FROM conversations c
        LEFT JOIN conversation_parts p ON p.conversation_id = c.id
        WHERE c.corpus_id = ?
        GROUP BY c.id
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(corpus_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| ConversationSummary {
            id: r.get("id"),
            title: r.get("title"),
            created_at: format_ts_iso(r.get("created_at")),
            part_count: r.get("part_count"),
        })
        .collect())
}

/// Delete a conversation and its parts. Invalid while a turn is in flight.
pub async fn delete_conversation(engine: &Engine, conversation_id: &str) -> Result<()> {
    conversation_header(&engine.pool, conversation_id).await?;

    let guard = engine
        .conversation_locks
        .try_acquire(conversation_id)
        .ok_or_else(|| Error::Busy(conversation_id.to_string()))?;

    sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .execute(&engine.pool)
        .await?;

    drop(guard);
    engine.conversation_locks.remove(conversation_id);
    Ok(())
}
