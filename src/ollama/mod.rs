//! Client for the local Ollama-compatible inference endpoint

mod client;

pub use client::{GenerateOptions, OllamaClient, OllamaError};
