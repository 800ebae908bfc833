//! Vector index over code chunks
//!
//! Ingestion splits raw file text into overlapping character windows,
//! extracts lightweight structural metadata per window, embeds each window
//! and persists the result keyed by (filename, window index, embedding
//! model). Search is cosine nearest-neighbor within a single embedding
//! model's vector space, with an additive relevance boost layered on top.

pub mod chunker;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod store;

pub use ingest::{IngestReport, Ingestor};
pub use models::{Chunk, RawMatch, SearchResult};
pub use store::{VectorIndex, SCHEMA_REVISION};
