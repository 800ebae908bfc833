//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the local inference endpoint
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Text-generation model identity
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Embedding model identity (names the vector space)
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding batch configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Generation sampling configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Verifier configuration
    #[serde(default)]
    pub verifier: VerifierConfig,
}

fn default_endpoint_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_generation_model() -> String {
    "llama3.1".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_request_timeout() -> u64 {
    120_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            generation_model: default_generation_model(),
            embedding_model: default_embedding_model(),
            request_timeout_ms: default_request_timeout(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            generation: GenerationConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CODESCOUT_ENDPOINT_URL") {
            config.endpoint_url = val;
        }

        if let Ok(val) = std::env::var("CODESCOUT_GENERATION_MODEL") {
            config.generation_model = val;
        }

        if let Ok(val) = std::env::var("CODESCOUT_EMBEDDING_MODEL") {
            config.embedding_model = val;
        }

        if let Ok(val) = std::env::var("CODESCOUT_REQUEST_TIMEOUT_MS") {
            if let Ok(num) = val.parse() {
                config.request_timeout_ms = num;
            }
        }

        if let Ok(val) = std::env::var("CODESCOUT_TOP_K") {
            if let Ok(num) = val.parse() {
                config.search.top_k = num;
            }
        }

        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Character-window chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Overlap between consecutive windows in characters
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_window_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
        }
    }
}

/// Embedding batch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Items per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds (rate-limit courtesy)
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Dimensionality of the deterministic fallback vector
    #[serde(default = "default_fallback_dimensions")]
    pub fallback_dimensions: usize,
}

fn default_batch_size() -> usize {
    8
}

fn default_batch_delay() -> u64 {
    100
}

fn default_fallback_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            fallback_dimensions: default_fallback_dimensions(),
        }
    }
}

/// Nearest-neighbor search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum results returned per search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum boosted score kept in results
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_top_k() -> usize {
    10
}

fn default_min_score() -> f32 {
    0.10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

/// Text-generation sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature (kept low to favor determinism)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens generated per answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Verifier configuration
///
/// The weights are observed constants with no stated derivation; they are
/// kept configurable rather than re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Confidence below which an improvement pass is requested
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f32,

    /// Check weights: relevance, accuracy, completeness, code validity, consistency
    #[serde(default = "default_weights")]
    pub weights: [f32; 5],
}

fn default_improvement_threshold() -> f32 {
    0.7
}

fn default_weights() -> [f32; 5] {
    [0.25, 0.25, 0.20, 0.15, 0.15]
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            improvement_threshold: default_improvement_threshold(),
            weights: default_weights(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.endpoint_url, "http://localhost:11434");
        assert_eq!(config.chunking.window_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.embedding.fallback_dimensions, 384);
    }

    #[test]
    fn test_verifier_weights_sum_to_one() {
        let config = VerifierConfig::default();
        let sum: f32 = config.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.top_k, 10);
        assert!((config.min_score - 0.10).abs() < f32::EPSILON);
    }
}
