use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema. Idempotent, safe to run on every startup.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corpora (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            default_prompt TEXT NOT NULL,
            embedding_model TEXT NOT NULL,
            completion_model TEXT NOT NULL,
            similarity_threshold REAL NOT NULL DEFAULT 0.7,
            path TEXT NOT NULL,
            collection_name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corpus_files (
            id TEXT PRIMARY KEY,
            corpus_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            is_ingested INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(corpus_id, filename),
            FOREIGN KEY (corpus_id) REFERENCES corpora(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            corpus_id TEXT NOT NULL,
            title TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (corpus_id) REFERENCES corpora(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // context_chunks and sources are ordered JSON arrays; order matters for
    // prompt replay and attribution.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_parts (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            part_index INTEGER NOT NULL,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            context_chunks TEXT NOT NULL DEFAULT '[]',
            sources TEXT NOT NULL DEFAULT '[]',
            chunks_retrieved INTEGER NOT NULL,
            embedding_model_used TEXT NOT NULL,
            completion_model_used TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(conversation_id, part_index),
            FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_corpus_files_corpus_id ON corpus_files(corpus_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_corpus_id ON conversations(corpus_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_parts_conversation_id ON conversation_parts(conversation_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
