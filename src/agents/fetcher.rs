//! Context fetcher
//!
//! Runs multi-query search against the vector index, parses the raw
//! matches and re-scores each chunk against the joined query text with a
//! secondary lexical heuristic. An empty corpus short-circuits with zero
//! confidence and no network calls.

use super::models::ContextChunk;
use super::{Agent, AgentResponse};
use crate::embedding::EmbeddingClient;
use crate::index::{RawMatch, VectorIndex};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const ERROR_FLAVORED_WORDS: &[&str] = &["error", "bug", "debug", "fix", "crash", "fail", "exception"];
const ERROR_CONTENT_TOKENS: &[&str] = &["try", "catch", "error", "panic", "except", "unwrap"];
const STRUCTURAL_MARKERS: &[&str] = &["function", "fn ", "class ", "const ", "def "];

/// Closed task set for the context fetcher
#[derive(Debug, Clone)]
pub enum FetcherTask {
    Fetch {
        queries: Vec<String>,
        corpus_available: bool,
    },
}

/// Context fetcher stage
pub struct ContextFetcher {
    index: Arc<VectorIndex>,
    embeddings: Arc<EmbeddingClient>,
    embedding_model: String,
    top_k: usize,
}

impl ContextFetcher {
    pub fn new(
        index: Arc<VectorIndex>,
        embeddings: Arc<EmbeddingClient>,
        embedding_model: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embeddings,
            embedding_model: embedding_model.into(),
            top_k,
        }
    }

    /// Retrieve, parse and re-score context for a set of queries
    pub async fn fetch(
        &self,
        queries: &[String],
        corpus_available: bool,
    ) -> (Vec<ContextChunk>, f32) {
        if !corpus_available || self.index.len_for_model(&self.embedding_model) == 0 {
            debug!("No corpus available; returning empty context without network calls");
            return (vec![], 0.0);
        }

        let matches = self
            .index
            .multi_query_search(queries, self.top_k, &self.embedding_model, &self.embeddings)
            .await;

        let joined_query = queries.join(" ");
        let mut chunks: Vec<ContextChunk> = matches
            .iter()
            .filter_map(|m| self.parse_match(m, &joined_query))
            .collect();

        chunks.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let confidence = fetch_confidence(&chunks);
        debug!(
            "Fetched {} context chunks (confidence {:.2})",
            chunks.len(),
            confidence
        );

        (chunks, confidence)
    }

    /// Parse one raw match (bracketed header + body) into a ContextChunk
    fn parse_match(&self, raw: &RawMatch, joined_query: &str) -> Option<ContextChunk> {
        let (filename, line_range, body) = match parse_raw_match(&raw.text) {
            Some(parsed) => parsed,
            None => {
                warn!("Discarding malformed raw match for chunk {}", raw.chunk_id);
                return None;
            }
        };

        let relevance_score = rescore(joined_query, body, &filename);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("chunk_id".to_string(), raw.chunk_id.clone());
        metadata.insert("boosted_score".to_string(), format!("{:.4}", raw.score));
        metadata.insert("embedding_model".to_string(), self.embedding_model.clone());

        Some(ContextChunk {
            content: body.to_string(),
            filename,
            line_range,
            relevance_score,
            metadata,
        })
    }
}

#[async_trait]
impl Agent for ContextFetcher {
    type Task = FetcherTask;
    type Output = Vec<ContextChunk>;

    fn name(&self) -> &'static str {
        "context_fetcher"
    }

    async fn handle(&self, task: Self::Task) -> AgentResponse<Self::Output> {
        let start = Instant::now();
        match task {
            FetcherTask::Fetch {
                queries,
                corpus_available,
            } => {
                let (chunks, confidence) = self.fetch(&queries, corpus_available).await;
                let sources: Vec<String> = chunks
                    .iter()
                    .map(|c| c.filename.clone())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();

                AgentResponse::ok(chunks)
                    .with_confidence(confidence)
                    .with_execution_time(start.elapsed().as_millis() as u64)
                    .with_sources(sources)
            }
        }
    }
}

/// Parse the `[filename:startLine-endLine]` header followed by content
fn parse_raw_match(text: &str) -> Option<(String, (usize, usize), &str)> {
    let (header, body) = text.split_once('\n')?;
    let header = header.strip_prefix('[')?.strip_suffix(']')?;
    let (filename, range) = header.rsplit_once(':')?;
    let (start, end) = range.split_once('-')?;

    Some((
        filename.to_string(),
        (start.parse().ok()?, end.parse().ok()?),
        body,
    ))
}

/// Secondary lexical heuristic scoring a chunk against the joined query
fn rescore(joined_query: &str, content: &str, filename: &str) -> f32 {
    let query_lower = joined_query.to_lowercase();
    let content_lower = content.to_lowercase();
    let filename_lower = filename.to_lowercase();

    let query_words: Vec<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() >= 3)
        .collect();

    let mut score = 0.5;

    if !query_words.is_empty() {
        let matched = query_words
            .iter()
            .filter(|w| content_lower.contains(**w))
            .count();
        score += 0.3 * matched as f32 / query_words.len() as f32;
    }

    if query_words.iter().any(|w| filename_lower.contains(*w)) {
        score += 0.2;
    }

    if STRUCTURAL_MARKERS.iter().any(|m| content_lower.contains(m)) {
        score += 0.1;
    }

    let error_flavored = ERROR_FLAVORED_WORDS.iter().any(|w| query_lower.contains(w));
    if error_flavored && ERROR_CONTENT_TOKENS.iter().any(|t| content_lower.contains(t)) {
        score += 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// Overall confidence: 0.7 x mean relevance + 0.3 x filename diversity
fn fetch_confidence(chunks: &[ContextChunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }

    let mean: f32 =
        chunks.iter().map(|c| c.relevance_score).sum::<f32>() / chunks.len() as f32;
    let distinct: HashSet<&str> = chunks.iter().map(|c| c.filename.as_str()).collect();
    let diversity = distinct.len() as f32 / chunks.len() as f32;

    (0.7 * mean + 0.3 * diversity).clamp(0.0, 1.0)
}
