//! Pipeline stages behind a uniform agent contract
//!
//! Every stage implements [`Agent`]: one entry point taking a closed,
//! stage-specific task enum and returning an [`AgentResponse`]. The task
//! enums replace string-tagged dispatch, so adding a task kind is a
//! compile-time-checked change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod enhancer;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod synthesizer;
pub mod verifier;

pub use enhancer::{EnhancerTask, QueryEnhancer};
pub use fetcher::{ContextFetcher, FetcherTask};
pub use models::*;
pub use orchestrator::Orchestrator;
pub use planner::{Planner, PlannerTask};
pub use synthesizer::{Synthesizer, SynthesizerTask};
pub use verifier::{VerifiedAnswer, Verifier, VerifierTask};

/// Optional response metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub confidence: Option<f32>,
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// The uniform call contract between the orchestrator and every stage
#[derive(Debug, Clone)]
pub struct AgentResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub meta: ResponseMeta,
}

impl<T> AgentResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            meta: ResponseMeta::default(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.meta.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.meta.execution_time_ms = Some(ms);
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.meta.sources = sources;
        self
    }
}

/// A pipeline stage.
///
/// Stage-specific behavior lives entirely behind this single seam; the
/// orchestrator only ever calls `handle`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Closed set of tasks this stage accepts
    type Task: Send;
    /// Payload produced on success
    type Output: Send;

    /// Stage name used in traces and degradation messages
    fn name(&self) -> &'static str;

    async fn handle(&self, task: Self::Task) -> AgentResponse<Self::Output>;
}

/// Status of one trace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Starting,
    Completed,
    Error,
}

/// One stage transition in a query's trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub agent_name: String,
    pub status: TraceStatus,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// Append-only log of per-stage start/end/error events for one query.
///
/// Entries are never mutated after append; the UI renders this directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTrace {
    entries: Vec<TraceEntry>,
}

impl AgentTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self, agent_name: &str) {
        self.entries.push(TraceEntry {
            agent_name: agent_name.to_string(),
            status: TraceStatus::Starting,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            result: None,
            error: None,
            execution_time_ms: None,
        });
    }

    pub fn record_completed(&mut self, agent_name: &str, result: String, execution_time_ms: u64) {
        self.entries.push(TraceEntry {
            agent_name: agent_name.to_string(),
            status: TraceStatus::Completed,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            result: Some(result),
            error: None,
            execution_time_ms: Some(execution_time_ms),
        });
    }

    pub fn record_error(&mut self, agent_name: &str, error: String, execution_time_ms: u64) {
        self.entries.push(TraceEntry {
            agent_name: agent_name.to_string(),
            status: TraceStatus::Error,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            result: None,
            error: Some(error),
            execution_time_ms: Some(execution_time_ms),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_confidence_is_clamped() {
        let response = AgentResponse::ok(()).with_confidence(1.7);
        assert_eq!(response.meta.confidence, Some(1.0));

        let response = AgentResponse::<()>::err("boom").with_confidence(-0.5);
        assert_eq!(response.meta.confidence, Some(0.0));
    }

    #[test]
    fn test_trace_is_append_only_in_order() {
        let mut trace = AgentTrace::new();
        trace.record_start("enhancer");
        trace.record_completed("enhancer", "5 queries".to_string(), 12);
        trace.record_start("fetcher");
        trace.record_error("fetcher", "index offline".to_string(), 3);

        let entries = trace.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].status, TraceStatus::Starting);
        assert_eq!(entries[1].status, TraceStatus::Completed);
        assert_eq!(entries[3].status, TraceStatus::Error);
        assert_eq!(entries[3].error.as_deref(), Some("index offline"));
    }
}
