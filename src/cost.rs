//! Ingestion cost estimator.
//!
//! Projects what embedding a corpus's un-ingested files would cost before
//! any of the work is performed. Pure local computation: file contents are
//! tokenized with the corpus's embedding-model tokenizer and priced from
//! the pricing table. The embedding provider is never called.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::corpus;
use crate::error::Result;
use crate::models::CorpusFile;
use crate::pricing::{self, Tokenizer};

/// Token/cost projection for a single file.
///
/// A file that cannot be read does not abort the estimate; it becomes a row
/// with `error` set and zero tokens.
#[derive(Debug, Clone, Serialize)]
pub struct FileCostRow {
    pub file_id: String,
    pub filename: String,
    pub tokens: u64,
    pub cost: f64,
    pub is_ingested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusCostSummary {
    pub corpus_id: String,
    pub corpus_name: String,
    pub model: String,
    pub files: Vec<FileCostRow>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub file_count: usize,
    pub ingested_count: usize,
    pub uningested_count: usize,
}

/// Estimate embedding cost for a corpus's files.
///
/// By default only not-yet-ingested files are included; pass
/// `include_ingested` to price a full re-ingestion.
pub async fn estimate_corpus_cost(
    pool: &SqlitePool,
    corpus_id: &str,
    include_ingested: bool,
) -> Result<CorpusCostSummary> {
    let corpus = corpus::get_corpus(pool, corpus_id).await?;

    let mut files = corpus::list_files(pool, corpus_id).await?;
    if !include_ingested {
        files.retain(|f| !f.is_ingested);
    }

    let tokenizer = Tokenizer::for_model(&corpus.embedding_model)?;
    let price_per_1k = pricing::price_per_1k_tokens(&corpus.embedding_model)?;

    let mut rows = Vec::with_capacity(files.len());
    let mut total_tokens: u64 = 0;
    let mut total_cost = 0.0;
    let mut ingested_count = 0;
    let mut uningested_count = 0;

    for file in &files {
        let row = estimate_file(&corpus.path, file, &tokenizer, price_per_1k);
        if row.error.is_none() {
            total_tokens += row.tokens;
            total_cost += row.cost;
            if row.is_ingested {
                ingested_count += 1;
            } else {
                uningested_count += 1;
            }
        }
        rows.push(row);
    }

    Ok(CorpusCostSummary {
        corpus_id: corpus.id,
        corpus_name: corpus.name,
        model: corpus.embedding_model,
        file_count: rows.len(),
        files: rows,
        total_tokens,
        total_cost,
        ingested_count,
        uningested_count,
    })
}

fn estimate_file(
    corpus_path: &str,
    file: &CorpusFile,
    tokenizer: &Tokenizer,
    price_per_1k: f64,
) -> FileCostRow {
    let path = std::path::Path::new(corpus_path).join(&file.filename);

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let tokens = tokenizer.count_tokens(&text) as u64;
            FileCostRow {
                file_id: file.id.clone(),
                filename: file.filename.clone(),
                tokens,
                cost: tokens as f64 * (price_per_1k / 1000.0),
                is_ingested: file.is_ingested,
                error: None,
            }
        }
        Err(e) => FileCostRow {
            file_id: file.id.clone(),
            filename: file.filename.clone(),
            tokens: 0,
            cost: 0.0,
            is_ingested: file.is_ingested,
            error: Some(format!("could not read file: {e}")),
        },
    }
}
