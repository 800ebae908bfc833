//! Data models for the vector index

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A fixed-size overlapping window of a source file's text, with its
/// embedding and extracted metadata.
///
/// Identity is `(filename, window_index, embedding_model)`. Chunks are
/// immutable once stored; re-ingesting a file under a different embedding
/// model adds new chunks alongside the old ones, and chunks from different
/// models are never compared to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub content: String,
    pub window_index: usize,
    /// Character offset of the window start in the source text
    pub window_start: usize,
    /// Character offset of the window end (exclusive)
    pub window_end: usize,
    /// 1-based line of the window start, computed from character offsets
    pub line_start: usize,
    /// 1-based line of the window end
    pub line_end: usize,
    /// Names which vector space the embedding belongs to
    pub embedding_model: String,
    pub embedding: Vec<f32>,
    pub identifiers: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
}

impl Chunk {
    /// Canonical chunk id for the identity triple
    pub fn make_id(filename: &str, window_index: usize, embedding_model: &str) -> String {
        format!("{}::{}::{}", filename, window_index, embedding_model)
    }
}

/// A single scored match from one nearest-neighbor search.
///
/// Ephemeral: produced per query and discarded after ranking.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    /// Cosine similarity, clamped to [0, 1]
    pub similarity: f32,
    /// Additive heuristic boost from identifier/keyword/filename matches
    pub relevance_boost: f32,
}

impl SearchResult {
    /// Boosted score, clamped to [0, 1]
    pub fn score(&self) -> f32 {
        (self.similarity + self.relevance_boost).clamp(0.0, 1.0)
    }
}

/// A deduplicated multi-query match rendered in the retrieval wire format:
/// a bracketed `[filename:startLine-endLine]` header line followed by the
/// chunk body.
#[derive(Debug, Clone)]
pub struct RawMatch {
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
}

impl RawMatch {
    pub fn render(chunk: &Chunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            score,
            text: format!(
                "[{}:{}-{}]\n{}",
                chunk.filename, chunk.line_start, chunk.line_end, chunk.content
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_format() {
        let id = Chunk::make_id("src/main.rs", 3, "nomic-embed-text");
        assert_eq!(id, "src/main.rs::3::nomic-embed-text");
    }

    #[test]
    fn test_search_result_score_clamped() {
        let result = SearchResult {
            chunk_id: "x".to_string(),
            similarity: 0.9,
            relevance_boost: 0.45,
        };
        assert_eq!(result.score(), 1.0);
    }
}
