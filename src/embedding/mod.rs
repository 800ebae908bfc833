//! Embedding client with deterministic offline fallback
//!
//! Wraps the inference endpoint's embedding call. When the endpoint is
//! unavailable the client substitutes a deterministic pseudo-random vector
//! derived from the input text, so ingestion never loses records; callers
//! must treat fallback-sourced embeddings as low confidence. The fallback
//! is reproducible per input but not similarity-meaningful across
//! unrelated texts.

use crate::config::EmbeddingConfig;
use crate::metrics::METRICS;
use crate::ollama::OllamaClient;
use dashmap::DashMap;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Linear-congruential recurrence constants for the fallback vector
const LCG_MULTIPLIER: i64 = 9301;
const LCG_INCREMENT: i64 = 49297;
const LCG_MODULUS: i64 = 233280;

/// Where an embedding vector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    /// Produced by the inference endpoint
    Endpoint,
    /// Deterministic offline substitute; low confidence
    Fallback,
}

/// An embedding vector together with its provenance
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub source: EmbeddingSource,
}

impl Embedding {
    pub fn is_fallback(&self) -> bool {
        self.source == EmbeddingSource::Fallback
    }
}

/// Outcome of a batch embedding run
#[derive(Debug)]
pub struct BatchEmbeddings {
    pub embeddings: Vec<Embedding>,
    pub success_count: usize,
    pub error_count: usize,
}

impl BatchEmbeddings {
    /// A batch is overall successful if fewer than half the items failed
    pub fn is_successful(&self) -> bool {
        self.error_count * 2 < self.embeddings.len().max(1)
    }
}

/// Embedding client
pub struct EmbeddingClient {
    ollama: Arc<OllamaClient>,
    config: EmbeddingConfig,
    /// Declared dimensionality per model, recorded from the first
    /// successful endpoint call
    dimensions: DashMap<String, usize>,
    /// Endpoint-sourced embeddings keyed by (model, text hash); fallback
    /// vectors are never cached so outages are retried
    cache: Cache<String, Vec<f32>>,
}

impl EmbeddingClient {
    pub fn new(ollama: Arc<OllamaClient>, config: EmbeddingConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(4096)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            ollama,
            config,
            dimensions: DashMap::new(),
            cache,
        }
    }

    /// Declared dimensionality for a model.
    ///
    /// Falls back to the fixed fallback-vector length until the endpoint
    /// has answered at least once for this model.
    pub fn dimensions_for(&self, model: &str) -> usize {
        self.dimensions
            .get(model)
            .map(|d| *d)
            .unwrap_or(self.config.fallback_dimensions)
    }

    /// Embed a text string.
    ///
    /// Never fails: endpoint errors are downgraded to the deterministic
    /// fallback vector.
    pub async fn embed(&self, text: &str, model: &str) -> Embedding {
        let key = cache_key(model, text);
        if let Some(values) = self.cache.get(&key).await {
            return Embedding {
                values,
                source: EmbeddingSource::Endpoint,
            };
        }

        match self.ollama.embeddings(model, text).await {
            Ok(values) => {
                self.dimensions
                    .entry(model.to_string())
                    .or_insert(values.len());
                self.cache.insert(key, values.clone()).await;
                METRICS.record_embedding(true);
                Embedding {
                    values,
                    source: EmbeddingSource::Endpoint,
                }
            }
            Err(e) => {
                warn!("Embedding endpoint failed, using fallback vector: {}", e);
                METRICS.record_embedding(false);
                Embedding {
                    values: self.fallback_embedding(text),
                    source: EmbeddingSource::Fallback,
                }
            }
        }
    }

    /// Embed texts in fixed-size batches.
    ///
    /// Items within a batch are embedded concurrently and joined before
    /// the next batch starts; a short pause separates batches to avoid
    /// overwhelming the endpoint. Failed items still receive fallback
    /// embeddings so the corpus stays complete.
    pub async fn batch_embed(&self, texts: &[String], model: &str) -> BatchEmbeddings {
        let batch_size = self.config.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut success_count = 0;
        let mut error_count = 0;

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }

            let futures = batch.iter().map(|text| self.embed(text, model));
            let batch_results = futures::future::join_all(futures).await;

            for embedding in batch_results {
                match embedding.source {
                    EmbeddingSource::Endpoint => success_count += 1,
                    EmbeddingSource::Fallback => error_count += 1,
                }
                embeddings.push(embedding);
            }

            debug!(
                "Embedded batch {} ({} items, {} ok / {} fallback so far)",
                batch_index + 1,
                batch.len(),
                success_count,
                error_count
            );
        }

        BatchEmbeddings {
            embeddings,
            success_count,
            error_count,
        }
    }

    /// Deterministic fallback vector for a text.
    ///
    /// Seeds an accumulator from the character codes weighted by position,
    /// iterates a linear-congruential recurrence to fill a fixed-length
    /// vector of values in [-0.5, 0.5], then L2-normalizes. Identical
    /// inputs always yield bit-identical vectors.
    pub fn fallback_embedding(&self, text: &str) -> Vec<f32> {
        let mut seed: i64 = 0;
        for (position, ch) in text.chars().enumerate() {
            seed = seed.wrapping_add((ch as u32 as i64) * (position as i64 + 1));
        }
        seed = seed.rem_euclid(LCG_MODULUS);

        let mut values = Vec::with_capacity(self.config.fallback_dimensions);
        for _ in 0..self.config.fallback_dimensions {
            seed = (seed * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
            values.push(seed as f32 / LCG_MODULUS as f32 - 0.5);
        }

        normalize(&mut values);
        values
    }
}

/// L2-normalize a vector in place; zero vectors are left untouched
pub fn normalize(values: &mut [f32]) {
    let magnitude: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for v in values.iter_mut() {
            *v /= magnitude;
        }
    }
}

fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{}:{}", model, hex::encode(hasher.finalize()))
}
