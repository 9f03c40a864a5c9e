//! Token-window text chunker.
//!
//! Splits document text into spans of at most `chunk_tokens` tokens, with
//! `overlap_tokens` tokens shared between consecutive spans so context is
//! not lost at boundaries. Windows are computed on the embedding model's
//! own token ids, so spans line up with what the provider will count.
//!
//! Chunking is deterministic: identical input text always produces
//! identical spans, which is what makes re-ingestion idempotent.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::Chunk;
use crate::pricing::Tokenizer;

pub struct Chunker {
    tokenizer: Tokenizer,
    chunk_tokens: usize,
    overlap_tokens: usize,
}

impl Chunker {
    pub fn new(model: &str, chunk_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        if chunk_tokens == 0 {
            return Err(Error::validation("chunk_tokens must be > 0"));
        }
        if overlap_tokens >= chunk_tokens {
            return Err(Error::validation(
                "overlap_tokens must be smaller than chunk_tokens",
            ));
        }
        Ok(Self {
            tokenizer: Tokenizer::for_model(model)?,
            chunk_tokens,
            overlap_tokens,
        })
    }

    /// Split `text` into overlapping token windows.
    ///
    /// Empty (or whitespace-only) documents yield zero chunks; a document
    /// shorter than one window yields exactly one chunk.
    pub fn chunk(&self, file_id: &str, text: &str) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.tokenizer.bpe().encode_with_special_tokens(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut chunk_index: i64 = 0;

        loop {
            let end = (start + self.chunk_tokens).min(tokens.len());
            let window = &tokens[start..end];

            let chunk_text = self
                .tokenizer
                .bpe()
                .decode(window.to_vec())
                .map_err(|e| Error::validation(format!("failed to decode token window: {e}")))?;

            chunks.push(make_chunk(file_id, chunk_index, &chunk_text, window.len()));
            chunk_index += 1;

            if end >= tokens.len() {
                break;
            }
            start = end - self.overlap_tokens;
        }

        Ok(chunks)
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text)
    }
}

fn make_chunk(file_id: &str, index: i64, text: &str, token_count: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        file_id: file_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        token_count,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_tokens: usize, overlap: usize) -> Chunker {
        Chunker::new("text-embedding-3-small", chunk_tokens, overlap).unwrap()
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let c = chunker(64, 8);
        assert!(c.chunk("f1", "").unwrap().is_empty());
        assert!(c.chunk("f1", "   \n\t").unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let c = chunker(64, 8);
        let chunks = c.chunk("f1", "Hello, world!").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_indices_contiguous() {
        let c = chunker(16, 4);
        let text = (0..80)
            .map(|i| format!("sentence number {i} about retrieval."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = c.chunk("f1", &text).unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_windows_respect_limits_and_overlap() {
        let c = chunker(16, 4);
        let text = (0..80)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = c.chunk("f1", &text).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 16);
        }
        // Every window except the last starts chunk_tokens - overlap after
        // the previous one, so each full window has exactly 16 tokens.
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.token_count, 16);
        }
    }

    #[test]
    fn test_deterministic() {
        let c = chunker(16, 4);
        let text = "Alpha beta gamma delta. ".repeat(40);
        let a = c.chunk("f1", &text).unwrap();
        let b = c.chunk("f1", &text).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        assert!(Chunker::new("text-embedding-3-small", 8, 8).is_err());
        assert!(Chunker::new("text-embedding-3-small", 0, 0).is_err());
    }
}
