//! HTTP client for the inference endpoint's generate and embeddings calls

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Inference endpoint error types
#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Sampling options for a generation call
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            num_predict: 2048,
            stop: vec![],
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Client for a local Ollama-compatible endpoint
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a new client for the given base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OllamaError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OllamaError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL this client points at
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text, non-streaming
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            options,
        };

        debug!("Calling generate: model={}, prompt={} chars", model, prompt.len());

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OllamaError::UpstreamError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OllamaError::InvalidResponse(e.to_string()))?;

        Ok(parsed.response)
    }

    /// Generate text in streaming mode.
    ///
    /// The endpoint emits line-delimited JSON fragments, each carrying an
    /// incremental `response` field; the fragments are concatenated here and
    /// the full text returned once the final fragment reports `done`.
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            stream: true,
            options,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OllamaError::UpstreamError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut answer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| OllamaError::RequestFailed(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<GenerateResponse>(line) {
                    Ok(fragment) => {
                        answer.push_str(&fragment.response);
                        if fragment.done {
                            return Ok(answer);
                        }
                    }
                    Err(e) => {
                        warn!("Skipping malformed stream fragment: {}", e);
                    }
                }
            }
        }

        // Endpoint closed the stream without a final `done` fragment; a
        // trailing unterminated line may still hold the last piece.
        let line = buffer.trim();
        if !line.is_empty() {
            if let Ok(fragment) = serde_json::from_str::<GenerateResponse>(line) {
                answer.push_str(&fragment.response);
            }
        }

        Ok(answer)
    }

    /// Produce an embedding vector for a text string
    pub async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f32>, OllamaError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingsRequest { model, prompt };

        debug!("Calling embeddings: model={}, prompt={} chars", model, prompt.len());

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OllamaError::UpstreamError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| OllamaError::InvalidResponse(e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(OllamaError::InvalidResponse(
                "Empty embedding vector".to_string(),
            ));
        }

        Ok(parsed.embedding)
    }
}

fn map_request_error(e: reqwest::Error) -> OllamaError {
    if e.is_timeout() {
        OllamaError::Timeout(e.to_string())
    } else {
        OllamaError::RequestFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response":"hello","done":true}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let answer = client
            .generate("test-model", "say hello", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(answer, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_stream_concatenates_fragments() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "{\"response\":\"Hel\",\"done\":false}\n",
            "{\"response\":\"lo \",\"done\":false}\n",
            "{\"response\":\"world\",\"done\":true}\n",
        );
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let answer = client
            .generate_stream("test-model", "greet", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(answer, "Hello world");
    }

    #[tokio::test]
    async fn test_embeddings_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body("model not found")
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let result = client.embeddings("missing-model", "text").await;

        assert!(matches!(result, Err(OllamaError::UpstreamError(_))));
    }

    #[tokio::test]
    async fn test_embeddings_rejects_empty_vector() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_body(r#"{"embedding":[]}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let result = client.embeddings("test-model", "text").await;

        assert!(matches!(result, Err(OllamaError::InvalidResponse(_))));
    }
}
