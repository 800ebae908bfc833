//! Persisted vector index with relevance-boosted multi-query search

use super::models::{Chunk, RawMatch, SearchResult};
use crate::config::SearchConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{PipelineError, Result};
use crate::metrics::METRICS;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Current persisted schema revision. Migrations are additive: older
/// revisions still load without re-embedding existing records.
pub const SCHEMA_REVISION: u32 = 2;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    schema_revision: u32,
    chunks: Vec<Chunk>,
}

struct IndexState {
    /// Insertion-ordered so equal-similarity ties resolve by insertion order
    chunks: IndexMap<String, Chunk>,
    /// First-seen embedding dimensionality per model
    dimensions: HashMap<String, usize>,
}

/// Vector index over code chunks.
///
/// Read by every query, written only during ingestion. Chunks from
/// different embedding models coexist and are never scored against each
/// other.
pub struct VectorIndex {
    state: RwLock<IndexState>,
    config: SearchConfig,
}

impl VectorIndex {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            state: RwLock::new(IndexState {
                chunks: IndexMap::new(),
                dimensions: HashMap::new(),
            }),
            config,
        }
    }

    /// Store a chunk, enforcing the per-model dimensionality invariant
    pub fn put(&self, chunk: Chunk) -> Result<()> {
        if chunk.embedding.is_empty() {
            return Err(PipelineError::Storage(format!(
                "Chunk {} has no embedding",
                chunk.id
            )));
        }

        let mut state = self.state.write().expect("index lock poisoned");

        let expected = *state
            .dimensions
            .entry(chunk.embedding_model.clone())
            .or_insert(chunk.embedding.len());
        if chunk.embedding.len() != expected {
            return Err(PipelineError::DimensionMismatch {
                model: chunk.embedding_model,
                expected,
                actual: chunk.embedding.len(),
            });
        }

        state.chunks.insert(chunk.id.clone(), chunk);
        METRICS.indexed_chunks.set(state.chunks.len() as f64);
        Ok(())
    }

    /// All stored chunks, in insertion order
    pub fn get_all(&self) -> Vec<Chunk> {
        let state = self.state.read().expect("index lock poisoned");
        state.chunks.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("index lock poisoned").chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks indexed under the given embedding model
    pub fn len_for_model(&self, model: &str) -> usize {
        let state = self.state.read().expect("index lock poisoned");
        state
            .chunks
            .values()
            .filter(|c| c.embedding_model == model)
            .count()
    }

    /// Nearest-neighbor search within one embedding model's vector space.
    ///
    /// Cross-model comparison is forbidden: if no chunks exist for the
    /// requested model the search returns empty and logs the missing
    /// compatible index. Ties are broken by insertion order.
    pub fn search(&self, query_embedding: &[f32], top_k: usize, model: &str) -> Vec<SearchResult> {
        let state = self.state.read().expect("index lock poisoned");

        let mut results: Vec<SearchResult> = state
            .chunks
            .values()
            .filter(|c| c.embedding_model == model)
            .map(|c| SearchResult {
                chunk_id: c.id.clone(),
                similarity: cosine_similarity(query_embedding, &c.embedding).clamp(0.0, 1.0),
                relevance_boost: 0.0,
            })
            .collect();

        if results.is_empty() {
            warn!("No compatible index for embedding model '{}'", model);
            return vec![];
        }

        // Stable sort keeps insertion order for equal similarities
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }

    /// Multi-query search with relevance boosting.
    ///
    /// Each query is embedded and scored against every compatible chunk;
    /// an additive boost on top of cosine similarity rewards identifier,
    /// class-name, keyword and filename matches. Across all queries a
    /// chunk keeps only its maximum boosted score, so no chunk id appears
    /// twice in the output.
    pub async fn multi_query_search(
        &self,
        queries: &[String],
        top_k: usize,
        model: &str,
        embeddings: &EmbeddingClient,
    ) -> Vec<RawMatch> {
        if self.len_for_model(model) == 0 {
            warn!("No compatible index for embedding model '{}'", model);
            return vec![];
        }

        // Best boosted score per chunk id, in first-encounter order
        let mut best: IndexMap<String, f32> = IndexMap::new();

        for query in queries {
            let query_embedding = embeddings.embed(query, model).await;

            let state = self.state.read().expect("index lock poisoned");
            for chunk in state.chunks.values().filter(|c| c.embedding_model == model) {
                let similarity =
                    cosine_similarity(&query_embedding.values, &chunk.embedding).clamp(0.0, 1.0);
                let boost = relevance_boost(query, chunk);
                let score = (similarity + boost).clamp(0.0, 1.0);

                if score < self.config.min_score {
                    continue;
                }

                let entry = best.entry(chunk.id.clone()).or_insert(score);
                if score > *entry {
                    *entry = score;
                }
            }
        }

        let mut scored: Vec<(String, f32)> = best.into_iter().collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let state = self.state.read().expect("index lock poisoned");
        let matches: Vec<RawMatch> = scored
            .into_iter()
            .filter_map(|(id, score)| state.chunks.get(&id).map(|c| RawMatch::render(c, score)))
            .collect();

        debug!(
            "Multi-query search over {} queries returned {} matches",
            queries.len(),
            matches.len()
        );

        matches
    }

    /// Write a JSON snapshot of the index
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let state = self.state.read().expect("index lock poisoned");
            PersistedIndex {
                schema_revision: SCHEMA_REVISION,
                chunks: state.chunks.values().cloned().collect(),
            }
        };

        let data = serde_json::to_string(&snapshot)?;
        tokio::fs::write(path, data).await?;
        debug!("Saved {} chunks to {}", snapshot.chunks.len(), path.display());
        Ok(())
    }

    /// Load a JSON snapshot, replacing current contents.
    ///
    /// Older schema revisions load as-is (migrations are additive and never
    /// require re-embedding); a newer revision than this build understands
    /// is rejected.
    pub async fn load(&self, path: &Path) -> Result<usize> {
        let data = tokio::fs::read_to_string(path).await?;
        let snapshot: PersistedIndex = serde_json::from_str(&data)?;

        if snapshot.schema_revision > SCHEMA_REVISION {
            return Err(PipelineError::SchemaRevision {
                found: snapshot.schema_revision,
                current: SCHEMA_REVISION,
            });
        }
        if snapshot.schema_revision < SCHEMA_REVISION {
            info!(
                "Loading index snapshot at schema revision {} (current {})",
                snapshot.schema_revision, SCHEMA_REVISION
            );
        }

        let mut state = self.state.write().expect("index lock poisoned");
        state.chunks.clear();
        state.dimensions.clear();
        for chunk in snapshot.chunks {
            state
                .dimensions
                .entry(chunk.embedding_model.clone())
                .or_insert(chunk.embedding.len());
            state.chunks.insert(chunk.id.clone(), chunk);
        }

        let loaded = state.chunks.len();
        METRICS.indexed_chunks.set(loaded as f64);
        info!("Loaded {} chunks from {}", loaded, path.display());
        Ok(loaded)
    }
}

/// Cosine similarity between two vectors; 0.0 on length mismatch
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Additive relevance boost for a chunk against one query text.
///
/// +0.20 for an identifier match, +0.20 for a class-name (capitalized
/// identifier) match, +0.10 for a keyword match, +0.15 when the filename
/// stem and query overlap.
pub fn relevance_boost(query: &str, chunk: &Chunk) -> f32 {
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();

    let mut boost = 0.0;

    let mut identifier_hit = false;
    let mut class_hit = false;
    for identifier in &chunk.identifiers {
        if !identifier_matches(identifier, &query_lower, &query_words) {
            continue;
        }
        if identifier.chars().next().is_some_and(|c| c.is_uppercase()) {
            class_hit = true;
        } else {
            identifier_hit = true;
        }
    }
    if identifier_hit {
        boost += 0.20;
    }
    if class_hit {
        boost += 0.20;
    }

    if chunk
        .keywords
        .iter()
        .any(|k| query_words.contains(&k.as_str()))
    {
        boost += 0.10;
    }

    if filename_matches(&chunk.filename, &query_lower, &query_words) {
        boost += 0.15;
    }

    boost
}

/// An identifier matches when it occurs in the query, or a query word of
/// length >= 4 occurs inside it (so "retry" reaches "retryRequest").
fn identifier_matches(identifier: &str, query_lower: &str, query_words: &[&str]) -> bool {
    let id_lower = identifier.to_lowercase();
    if query_lower.contains(&id_lower) {
        return true;
    }
    query_words
        .iter()
        .any(|w| w.len() >= 4 && id_lower.contains(w))
}

fn filename_matches(filename: &str, query_lower: &str, query_words: &[&str]) -> bool {
    let basename = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = basename.rsplit_once('.').map_or(basename, |(s, _)| s);
    let stem_lower = stem.to_lowercase();

    if stem_lower.len() >= 3 && query_lower.contains(&stem_lower) {
        return true;
    }
    query_words
        .iter()
        .any(|w| w.len() >= 4 && stem_lower.contains(w))
}
