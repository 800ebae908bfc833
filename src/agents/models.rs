//! Shared data models for the pipeline stages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The externally visible, deduplicated, ranked unit of evidence.
///
/// Ordering is significant: highest relevance first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    pub content: String,
    pub filename: String,
    /// 1-based inclusive line range
    pub line_range: (usize, usize),
    pub relevance_score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A planner-selected analysis directive.
///
/// Consumed only by prompt construction, never executed as code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub confidence: f32,
}

/// One phase of an execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub tools: Vec<String>,
    pub estimated_time_ms: u64,
}

/// The planner's fixed three-phase grouping of selected tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<PlanPhase>,
    pub total_complexity: f32,
    pub requires_verification: bool,
}

/// Query intent categories; multiple may match one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Explanation,
    Debugging,
    Implementation,
    Optimization,
    Search,
    Analysis,
    Documentation,
    Testing,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explanation => "explanation",
            Self::Debugging => "debugging",
            Self::Implementation => "implementation",
            Self::Optimization => "optimization",
            Self::Search => "search",
            Self::Analysis => "analysis",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
            Self::General => "general",
        }
    }
}

/// Outcome of intent classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// First matched intent, `General` when none matched
    pub primary_type: QueryIntent,
    pub matched_types: Vec<QueryIntent>,
    pub complexity: f32,
}

/// Query priority derived from intent and complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// The planner's full output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutput {
    pub analysis: QueryAnalysis,
    pub tools: Vec<ToolCall>,
    pub plan: ExecutionPlan,
    pub priority: Priority,
}

/// A synthesized answer with its confidence heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub confidence: f32,
}

/// Independent quality-check scores for one answer, each in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub relevance: f32,
    pub accuracy: f32,
    pub completeness: f32,
    pub code_validity: f32,
    pub consistency: f32,
    /// Weighted sum of the five checks
    pub overall_confidence: f32,
    pub issues: Vec<String>,
    /// Whether an improvement pass replaced the draft answer
    pub improved: bool,
}

/// One conversation turn, oldest first in history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Final pipeline output exposed to the UI collaborator.
///
/// The UI renders trace/context/tool data but never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    /// Correlation id assigned when the query enters the pipeline
    pub query_id: String,
    pub answer: String,
    pub context_used: Vec<ContextChunk>,
    pub tools_used: Vec<ToolCall>,
    pub enhanced_queries: Vec<String>,
    pub trace: super::AgentTrace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_names() {
        assert_eq!(QueryIntent::Debugging.as_str(), "debugging");
        assert_eq!(QueryIntent::General.as_str(), "general");
    }

    #[test]
    fn test_pipeline_response_serializes() {
        let response = PipelineResponse {
            query_id: "q-1".to_string(),
            answer: "done".to_string(),
            context_used: vec![],
            tools_used: vec![],
            enhanced_queries: vec!["q".to_string()],
            trace: super::super::AgentTrace::new(),
            verification: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("enhanced_queries"));
    }
}
