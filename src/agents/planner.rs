//! Query planner
//!
//! Classifies query intent with independent pattern tests, estimates
//! complexity, selects analysis tools and groups them into a fixed
//! three-phase execution plan. Entirely deterministic; no endpoint calls.

use super::models::{
    ContextChunk, ConversationTurn, ExecutionPlan, PlanOutput, PlanPhase, Priority, QueryAnalysis,
    QueryIntent, ToolCall,
};
use super::{Agent, AgentResponse};
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

const CONJUNCTION_WORDS: &[&str] = &[" and ", " or ", " also ", " as well as ", " plus "];

/// Per-intent pattern tests. Every matching intent contributes to the
/// analysis; the first match is the primary type.
const INTENT_PATTERNS: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::Explanation,
        &["how does", "what is", "what does", "explain", "describe", "understand"],
    ),
    (
        QueryIntent::Debugging,
        &["error", "bug", "crash", "broken", "fail", "fix", "not working", "wrong"],
    ),
    (
        QueryIntent::Implementation,
        &["implement", "create", "build", "write", "add a", "how to"],
    ),
    (
        QueryIntent::Optimization,
        &["optimize", "performance", "slow", "faster", "speed up", "efficient"],
    ),
    (
        QueryIntent::Search,
        &["find", "where is", "where are", "locate", "search", "which file"],
    ),
    (
        QueryIntent::Analysis,
        &["analyze", "structure", "architecture", "dependencies", "overview", "design"],
    ),
    (
        QueryIntent::Documentation,
        &["document", "comment", "readme", "docs", "docstring"],
    ),
    (
        QueryIntent::Testing,
        &["test", "coverage", "assert", "mock", "spec file"],
    ),
];

/// Fixed intent-to-tool table. Tools are additive across matched intents.
const TOOL_TABLE: &[(QueryIntent, &[(&str, f32)])] = &[
    (QueryIntent::Explanation, &[("code_explainer", 0.90)]),
    (
        QueryIntent::Debugging,
        &[("debug_assistant", 0.95), ("error_analyzer", 0.85)],
    ),
    (QueryIntent::Implementation, &[("code_generator", 0.90)]),
    (QueryIntent::Optimization, &[("performance_analyzer", 0.90)]),
    (QueryIntent::Search, &[("code_search", 0.95)]),
    (
        QueryIntent::Analysis,
        &[("static_analyzer", 0.85), ("dependency_mapper", 0.80)],
    ),
    (QueryIntent::Documentation, &[("doc_summarizer", 0.85)]),
    (QueryIntent::Testing, &[("test_advisor", 0.85)]),
];

/// Tools whose names mark them as analysis-phase work; everything else
/// lands in the processing phase.
const ANALYSIS_PHASE_TOOLS: &[&str] = &[
    "code_explainer",
    "error_analyzer",
    "static_analyzer",
    "dependency_mapper",
    "code_search",
];

/// Closed task set for the planner
#[derive(Debug, Clone)]
pub enum PlannerTask {
    Plan {
        query: String,
        context: Vec<ContextChunk>,
        history: Vec<ConversationTurn>,
    },
}

/// Planner stage
#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Classify the query and produce tools, plan and priority
    pub fn analyze_and_plan(
        &self,
        query: &str,
        _context: &[ContextChunk],
        _history: &[ConversationTurn],
    ) -> PlanOutput {
        let analysis = classify(query);
        let tools = select_tools(&analysis.matched_types);
        let plan = build_plan(&tools, analysis.complexity);
        let priority = priority_of(&analysis);

        debug!(
            "Planned query as {} (complexity {:.2}, {} tools, priority {:?})",
            analysis.primary_type.as_str(),
            analysis.complexity,
            tools.len(),
            priority
        );

        PlanOutput {
            analysis,
            tools,
            plan,
            priority,
        }
    }
}

#[async_trait]
impl Agent for Planner {
    type Task = PlannerTask;
    type Output = PlanOutput;

    fn name(&self) -> &'static str {
        "planner"
    }

    async fn handle(&self, task: Self::Task) -> AgentResponse<Self::Output> {
        let start = Instant::now();
        match task {
            PlannerTask::Plan {
                query,
                context,
                history,
            } => {
                let output = self.analyze_and_plan(&query, &context, &history);
                let confidence = 1.0 - output.analysis.complexity * 0.3;
                AgentResponse::ok(output)
                    .with_confidence(confidence)
                    .with_execution_time(start.elapsed().as_millis() as u64)
            }
        }
    }
}

/// Run every intent pattern test; multiple intents may match one query
fn classify(query: &str) -> QueryAnalysis {
    let query_lower = query.to_lowercase();

    let matched_types: Vec<QueryIntent> = INTENT_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| query_lower.contains(p)))
        .map(|(intent, _)| *intent)
        .collect();

    let primary_type = matched_types.first().copied().unwrap_or(QueryIntent::General);
    let complexity = complexity_of(query, matched_types.len());

    QueryAnalysis {
        primary_type,
        matched_types,
        complexity,
    }
}

fn complexity_of(query: &str, matched_count: usize) -> f32 {
    let len = query.len() as f32;
    let query_lower = query.to_lowercase();

    let mut complexity = 0.3 + (len / 500.0).min(0.2) + 0.1 * matched_count as f32;
    if CONJUNCTION_WORDS.iter().any(|w| query_lower.contains(w)) {
        complexity += 0.1;
    }
    if query.len() > 200 {
        complexity += 0.1;
    }

    complexity.min(1.0)
}

fn select_tools(matched: &[QueryIntent]) -> Vec<ToolCall> {
    let mut tools = Vec::new();
    for (intent, entries) in TOOL_TABLE {
        if matched.contains(intent) {
            for (name, confidence) in entries.iter() {
                if tools.iter().any(|t: &ToolCall| t.name == *name) {
                    continue;
                }
                tools.push(ToolCall {
                    name: name.to_string(),
                    parameters: serde_json::json!({ "intent": intent.as_str() }),
                    result: None,
                    confidence: *confidence,
                });
            }
        }
    }
    tools
}

/// Fixed analysis / processing / synthesis structure with tools
/// partitioned by name into the first two phases
fn build_plan(tools: &[ToolCall], complexity: f32) -> ExecutionPlan {
    let (analysis_tools, processing_tools): (Vec<String>, Vec<String>) = tools
        .iter()
        .map(|t| t.name.clone())
        .partition(|name| ANALYSIS_PHASE_TOOLS.contains(&name.as_str()));

    let phases = vec![
        PlanPhase {
            name: "analysis".to_string(),
            estimated_time_ms: 400 + 300 * analysis_tools.len() as u64,
            tools: analysis_tools,
        },
        PlanPhase {
            name: "processing".to_string(),
            estimated_time_ms: 400 + 300 * processing_tools.len() as u64,
            tools: processing_tools,
        },
        PlanPhase {
            name: "synthesis".to_string(),
            tools: vec![],
            estimated_time_ms: 800,
        },
    ];

    ExecutionPlan {
        phases,
        total_complexity: complexity,
        requires_verification: complexity > 0.8,
    }
}

fn priority_of(analysis: &QueryAnalysis) -> Priority {
    if analysis.matched_types.contains(&QueryIntent::Debugging) || analysis.complexity > 0.8 {
        Priority::High
    } else if analysis.matched_types.contains(&QueryIntent::Implementation) {
        Priority::Medium
    } else {
        Priority::Low
    }
}
