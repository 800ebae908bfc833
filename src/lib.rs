//! Retrieval-augmented question answering over a local code corpus.
//!
//! A query flows through five sequential stages: enhancement, context
//! fetching, planning, synthesis and verification. Retrieval runs against
//! an in-process vector index built by [`index::Ingestor`]; generation
//! and embeddings come from a local Ollama-compatible endpoint, with a
//! deterministic fallback embedding when the endpoint is unavailable.

pub mod agents;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod metrics;
pub mod ollama;

pub use agents::{Orchestrator, PipelineResponse};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use index::{Ingestor, VectorIndex};

/// Initialize structured logging from `RUST_LOG`, defaulting to `info`
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
