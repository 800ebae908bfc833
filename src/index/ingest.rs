//! Corpus ingestion: chunk, embed, store

use super::chunker;
use super::models::Chunk;
use super::store::VectorIndex;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of ingesting one file
#[derive(Debug)]
pub struct IngestReport {
    pub filename: String,
    pub chunks: usize,
    /// Chunks whose embedding came from the deterministic fallback
    pub fallback_embeddings: usize,
}

/// Ingests raw file text into the vector index.
///
/// Concurrent ingestion of multiple files is not ordering-sensitive: each
/// chunk's key is unique, so per-key writes need no further coordination.
pub struct Ingestor {
    index: Arc<VectorIndex>,
    embeddings: Arc<EmbeddingClient>,
    chunking: ChunkingConfig,
    embedding_model: String,
}

impl Ingestor {
    pub fn new(
        index: Arc<VectorIndex>,
        embeddings: Arc<EmbeddingClient>,
        chunking: ChunkingConfig,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embeddings,
            chunking,
            embedding_model: embedding_model.into(),
        }
    }

    /// Chunk a file, embed every window in batches and store the results.
    ///
    /// Partial embedding failures do not lose records: failed windows carry
    /// fallback embeddings so the corpus stays complete.
    pub async fn ingest_file(&self, filename: &str, text: &str) -> Result<IngestReport> {
        let mut chunks = chunker::chunk(filename, text, &self.chunking);
        if chunks.is_empty() {
            info!("Skipping empty file {}", filename);
            return Ok(IngestReport {
                filename: filename.to_string(),
                chunks: 0,
                fallback_embeddings: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch = self.embeddings.batch_embed(&texts, &self.embedding_model).await;

        if !batch.is_successful() {
            warn!(
                "Embedding batch for {} mostly failed ({} of {} items); fallback vectors in use",
                filename,
                batch.error_count,
                texts.len()
            );
        }

        let mut fallback_embeddings = 0;
        for (chunk, embedding) in chunks.iter_mut().zip(batch.embeddings) {
            if embedding.is_fallback() {
                fallback_embeddings += 1;
            }
            chunk.embedding_model = self.embedding_model.clone();
            chunk.id = Chunk::make_id(filename, chunk.window_index, &self.embedding_model);
            chunk.embedding = embedding.values;
        }

        let total = chunks.len();
        for chunk in chunks {
            self.index.put(chunk)?;
        }

        info!(
            "Ingested {}: {} chunks ({} fallback embeddings)",
            filename, total, fallback_embeddings
        );

        Ok(IngestReport {
            filename: filename.to_string(),
            chunks: total,
            fallback_embeddings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, SearchConfig};
    use crate::ollama::OllamaClient;
    use std::time::Duration;

    fn ingestor_for(url: &str) -> (Arc<VectorIndex>, Ingestor) {
        let index = Arc::new(VectorIndex::new(SearchConfig::default()));
        let ollama = Arc::new(OllamaClient::new(url, Duration::from_millis(200)).unwrap());
        let embeddings = Arc::new(EmbeddingClient::new(ollama, EmbeddingConfig::default()));
        let ingestor = Ingestor::new(
            index.clone(),
            embeddings,
            ChunkingConfig::default(),
            "test-model",
        );
        (index, ingestor)
    }

    #[tokio::test]
    async fn test_ingest_offline_uses_fallback_and_keeps_corpus_complete() {
        let (index, ingestor) = ingestor_for("http://localhost:1");

        let text = "fn alpha() {}\n".repeat(120);
        let report = ingestor.ingest_file("src/alpha.rs", &text).await.unwrap();

        assert!(report.chunks > 1);
        assert_eq!(report.fallback_embeddings, report.chunks);
        assert_eq!(index.len_for_model("test-model"), report.chunks);
    }

    #[tokio::test]
    async fn test_ingest_empty_file() {
        let (index, ingestor) = ingestor_for("http://localhost:1");
        let report = ingestor.ingest_file("empty.rs", "").await.unwrap();
        assert_eq!(report.chunks, 0);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_reingest_same_file_supersedes_by_key() {
        let (index, ingestor) = ingestor_for("http://localhost:1");

        let text = "fn beta() {}";
        ingestor.ingest_file("beta.rs", text).await.unwrap();
        ingestor.ingest_file("beta.rs", text).await.unwrap();

        // Same (filename, window, model) key: no duplicates accumulate
        assert_eq!(index.len_for_model("test-model"), 1);
    }
}
