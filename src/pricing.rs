//! Embedding model registry: tokenizer, pricing, and vector dimensions.
//!
//! Cost estimation is a pure local computation: token counts come from the
//! model's tokenizer (tiktoken), never from the provider. Prices are USD per
//! 1,000 tokens.

use tiktoken_rs::CoreBPE;

use crate::error::{Error, Result};

struct ModelEntry {
    model: &'static str,
    price_per_1k_tokens: f64,
    dims: usize,
}

const EMBEDDING_MODELS: &[ModelEntry] = &[
    ModelEntry {
        model: "text-embedding-3-small",
        price_per_1k_tokens: 0.00002,
        dims: 1536,
    },
    ModelEntry {
        model: "text-embedding-3-large",
        price_per_1k_tokens: 0.00013,
        dims: 3072,
    },
];

fn lookup(model: &str) -> Option<&'static ModelEntry> {
    EMBEDDING_MODELS.iter().find(|e| e.model == model)
}

/// Whether the embedding model is known to the pricing table.
pub fn is_supported_embedding_model(model: &str) -> bool {
    lookup(model).is_some()
}

/// All embedding models the engine can price and tokenize.
pub fn supported_embedding_models() -> Vec<&'static str> {
    EMBEDDING_MODELS.iter().map(|e| e.model).collect()
}

/// USD per 1,000 tokens for the given embedding model.
pub fn price_per_1k_tokens(model: &str) -> Result<f64> {
    lookup(model)
        .map(|e| e.price_per_1k_tokens)
        .ok_or_else(|| Error::validation(format!("unknown embedding model: {model}")))
}

/// Vector dimensionality for the given embedding model.
pub fn embedding_dims(model: &str) -> Result<usize> {
    lookup(model)
        .map(|e| e.dims)
        .ok_or_else(|| Error::validation(format!("unknown embedding model: {model}")))
}

/// Projected cost of embedding `tokens` tokens with `model`.
pub fn embedding_cost(model: &str, tokens: usize) -> Result<f64> {
    Ok(tokens as f64 * (price_per_1k_tokens(model)? / 1000.0))
}

/// Token counter bound to one model's encoding.
///
/// Construction loads the BPE ranks, which is not free. Build once per
/// operation and reuse across files.
pub struct Tokenizer {
    bpe: CoreBPE,
    model: String,
}

impl Tokenizer {
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .map_err(|e| Error::validation(format!("failed to load tokenizer: {e}")))?;
        Ok(Self {
            bpe,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    pub(crate) fn bpe(&self) -> &CoreBPE {
        &self.bpe
    }
}
