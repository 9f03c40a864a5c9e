//! Corpus lifecycle: create, update, list, delete, and file discovery.
//!
//! A corpus exclusively owns its files, conversations, and vector
//! collection. Deleting it cascades through all of them.

use globset::{Glob, GlobSetBuilder};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::models::{Corpus, CorpusFile};
use crate::pricing;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct CreateCorpus {
    pub name: String,
    pub description: Option<String>,
    pub default_prompt: String,
    pub embedding_model: Option<String>,
    pub completion_model: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub path: String,
    pub collection_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCorpus {
    pub name: Option<String>,
    pub description: Option<String>,
    pub default_prompt: Option<String>,
    pub embedding_model: Option<String>,
    pub completion_model: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub path: Option<String>,
}

pub async fn create_corpus(pool: &SqlitePool, req: CreateCorpus) -> Result<Corpus> {
    if req.name.trim().is_empty() {
        return Err(Error::validation("corpus name must not be empty"));
    }
    if req.default_prompt.trim().is_empty() {
        return Err(Error::validation("default_prompt must not be empty"));
    }
    if req.path.trim().is_empty() {
        return Err(Error::validation("corpus path must not be empty"));
    }

    let embedding_model = req
        .embedding_model
        .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
    if !pricing::is_supported_embedding_model(&embedding_model) {
        return Err(Error::validation(format!(
            "unknown embedding model: {embedding_model} (supported: {})",
            pricing::supported_embedding_models().join(", ")
        )));
    }

    let completion_model = req
        .completion_model
        .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());

    let threshold = req
        .similarity_threshold
        .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
    validate_threshold(threshold)?;

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM corpora WHERE name = ?")
        .bind(&req.name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(Error::validation(format!(
            "corpus with name '{}' already exists",
            req.name
        )));
    }

    let id = Uuid::new_v4().to_string();
    let collection_name = req
        .collection_name
        .unwrap_or_else(|| format!("corpus_{}", &id[..8]));
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO corpora
            (id, name, description, default_prompt, embedding_model, completion_model,
             similarity_threshold, path, collection_name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.default_prompt)
    .bind(&embedding_model)
    .bind(&completion_model)
    .bind(threshold)
    .bind(&req.path)
    .bind(&collection_name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_corpus(pool, &id).await
}

pub async fn get_corpus(pool: &SqlitePool, id: &str) -> Result<Corpus> {
    let row = sqlx::query("SELECT * FROM corpora WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_corpus(&r))
        .ok_or_else(|| Error::not_found("corpus", id))
}

/// Resolve a corpus by id first, then by unique name. CLI convenience.
pub async fn resolve_corpus(pool: &SqlitePool, id_or_name: &str) -> Result<Corpus> {
    if let Ok(corpus) = get_corpus(pool, id_or_name).await {
        return Ok(corpus);
    }

    let row = sqlx::query("SELECT * FROM corpora WHERE name = ?")
        .bind(id_or_name)
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_corpus(&r))
        .ok_or_else(|| Error::not_found("corpus", id_or_name))
}

pub async fn list_corpora(pool: &SqlitePool) -> Result<Vec<Corpus>> {
    let rows = sqlx::query("SELECT * FROM corpora ORDER BY name ASC")
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(row_to_corpus).collect())
}

pub async fn update_corpus(pool: &SqlitePool, id: &str, req: UpdateCorpus) -> Result<Corpus> {
    let current = get_corpus(pool, id).await?;

    if let Some(ref name) = req.name {
        if name.trim().is_empty() {
            return Err(Error::validation("corpus name must not be empty"));
        }
        if name != &current.name {
            let taken: Option<String> =
                sqlx::query_scalar("SELECT id FROM corpora WHERE name = ? AND id != ?")
                    .bind(name)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
            if taken.is_some() {
                return Err(Error::validation(format!(
                    "corpus with name '{name}' already exists"
                )));
            }
        }
    }

    if let Some(ref prompt) = req.default_prompt {
        if prompt.trim().is_empty() {
            return Err(Error::validation("default_prompt must not be empty"));
        }
    }

    if let Some(threshold) = req.similarity_threshold {
        validate_threshold(threshold)?;
    }

    if let Some(ref model) = req.embedding_model {
        if !pricing::is_supported_embedding_model(model) {
            return Err(Error::validation(format!(
                "unknown embedding model: {model}"
            )));
        }
        // Vectors already written under the old model would be unusable
        // alongside new ones; the model is frozen once anything is ingested.
        if model != &current.embedding_model && ingested_file_count(pool, id).await? > 0 {
            return Err(Error::validation(
                "embedding model cannot be changed after files have been ingested; \
                 create a new corpus instead",
            ));
        }
    }

    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        UPDATE corpora SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            default_prompt = COALESCE(?, default_prompt),
            embedding_model = COALESCE(?, embedding_model),
            completion_model = COALESCE(?, completion_model),
            similarity_threshold = COALESCE(?, similarity_threshold),
            path = COALESCE(?, path),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.default_prompt)
    .bind(&req.embedding_model)
    .bind(&req.completion_model)
    .bind(req.similarity_threshold)
    .bind(&req.path)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    get_corpus(pool, id).await
}

/// Delete a corpus, its files, conversations, parts, and vector collection.
///
/// Idempotent: deleting a missing corpus returns `Ok(false)`, since the
/// desired state already holds. The collection is dropped before the rows so a
/// store failure leaves the corpus intact and retryable.
pub async fn delete_corpus(engine: &Engine, id: &str) -> Result<bool> {
    let corpus = match get_corpus(&engine.pool, id).await {
        Ok(corpus) => corpus,
        Err(Error::NotFound { .. }) => return Ok(false),
        Err(e) => return Err(e),
    };

    engine
        .vectors
        .drop_collection(&corpus.collection_name)
        .await?;

    sqlx::query("DELETE FROM corpora WHERE id = ?")
        .bind(id)
        .execute(&engine.pool)
        .await?;

    engine.ingest_locks.remove(id);
    Ok(true)
}

/// Discover `*.txt` files under the corpus path and record the new ones
/// with `is_ingested = false`. Returns only the newly added rows, in
/// filename order.
pub async fn scan_corpus_files(pool: &SqlitePool, corpus_id: &str) -> Result<Vec<CorpusFile>> {
    let corpus = get_corpus(pool, corpus_id).await?;

    let root = std::path::Path::new(&corpus.path);
    if !root.is_dir() {
        return Err(Error::validation(format!(
            "corpus path is not a directory: {}",
            corpus.path
        )));
    }

    let mut builder = GlobSetBuilder::new();
    builder.add(
        Glob::new("**/*.txt").map_err(|e| Error::validation(format!("bad scan glob: {e}")))?,
    );
    let globs = builder
        .build()
        .map_err(|e| Error::validation(format!("bad scan glob: {e}")))?;

    let mut discovered = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| Error::validation(format!("scan failed: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        if globs.is_match(&rel) {
            discovered.push(rel);
        }
    }
    discovered.sort();

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT filename FROM corpus_files WHERE corpus_id = ?")
            .bind(corpus_id)
            .fetch_all(pool)
            .await?;
    let existing: std::collections::HashSet<String> = existing.into_iter().collect();

    let now = chrono::Utc::now().timestamp();
    let mut added = Vec::new();

    for filename in discovered {
        if existing.contains(&filename) {
            continue;
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO corpus_files (id, corpus_id, filename, is_ingested, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(corpus_id)
        .bind(&filename)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        added.push(CorpusFile {
            id,
            corpus_id: corpus_id.to_string(),
            filename,
            is_ingested: false,
            created_at: now,
            updated_at: now,
        });
    }

    Ok(added)
}

pub async fn list_files(pool: &SqlitePool, corpus_id: &str) -> Result<Vec<CorpusFile>> {
    get_corpus(pool, corpus_id).await?;

    let rows = sqlx::query(
        "SELECT * FROM corpus_files WHERE corpus_id = ? ORDER BY filename ASC",
    )
    .bind(corpus_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_file).collect())
}

pub(crate) async fn ingested_file_count(pool: &SqlitePool, corpus_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM corpus_files WHERE corpus_id = ? AND is_ingested = 1",
    )
    .bind(corpus_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::validation(
            "similarity_threshold must be in [0.0, 1.0]",
        ));
    }
    Ok(())
}

pub(crate) fn row_to_corpus(row: &sqlx::sqlite::SqliteRow) -> Corpus {
    Corpus {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        default_prompt: row.get("default_prompt"),
        embedding_model: row.get("embedding_model"),
        completion_model: row.get("completion_model"),
        similarity_threshold: row.get("similarity_threshold"),
        path: row.get("path"),
        collection_name: row.get("collection_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> CorpusFile {
    CorpusFile {
        id: row.get("id"),
        corpus_id: row.get("corpus_id"),
        filename: row.get("filename"),
        is_ingested: row.get::<i64, _>("is_ingested") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
