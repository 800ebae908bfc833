//! Answer synthesizer
//!
//! Builds a gated system prompt from retrieved context, planner tool
//! selections and recent conversation turns, then calls the generation
//! endpoint. Endpoint failures surface as errors; no answer text is ever
//! fabricated here.

use super::models::{ContextChunk, ConversationTurn, SynthesizedAnswer, ToolCall, TurnRole};
use super::{Agent, AgentResponse};
use crate::config::GenerationConfig;
use crate::ollama::{GenerateOptions, OllamaClient};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// History turns included in the prompt
const HISTORY_WINDOW: usize = 4;

/// Human-readable descriptions for the planner's tool names
const TOOL_DESCRIPTIONS: &[(&str, &str)] = &[
    ("code_explainer", "walks through code behavior step by step"),
    ("debug_assistant", "isolates likely failure causes"),
    ("error_analyzer", "interprets error messages and stack traces"),
    ("code_generator", "drafts implementation skeletons"),
    ("performance_analyzer", "identifies hot paths and inefficiencies"),
    ("code_search", "locates definitions and usages"),
    ("static_analyzer", "inspects structure and data flow"),
    ("dependency_mapper", "maps relationships between modules"),
    ("doc_summarizer", "condenses documentation and comments"),
    ("test_advisor", "suggests test cases and coverage gaps"),
];

const DEFAULT_TOOL_DESCRIPTION: &str = "specialized analysis tool";

/// Closed task set for the synthesizer
#[derive(Debug, Clone)]
pub enum SynthesizerTask {
    Synthesize {
        query: String,
        context: Vec<ContextChunk>,
        tools: Vec<ToolCall>,
        history: Vec<ConversationTurn>,
        complexity: f32,
    },
    /// Single improvement pass driven by verifier issues
    Improve {
        query: String,
        answer: String,
        issues: Vec<String>,
        context: Vec<ContextChunk>,
    },
}

/// Synthesizer stage
pub struct Synthesizer {
    ollama: Arc<OllamaClient>,
    model: String,
    generation: GenerationConfig,
}

impl Synthesizer {
    pub fn new(
        ollama: Arc<OllamaClient>,
        model: impl Into<String>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            ollama,
            model: model.into(),
            generation,
        }
    }

    /// Generate an answer from context, tools and history
    pub async fn synthesize(
        &self,
        query: &str,
        context: &[ContextChunk],
        tools: &[ToolCall],
        history: &[ConversationTurn],
        complexity: f32,
    ) -> Result<SynthesizedAnswer, crate::ollama::OllamaError> {
        let prompt = build_prompt(query, context, tools, history, complexity);
        let text = self.generate(&prompt).await?;
        let confidence = answer_confidence(&text, context.len(), tools.len());

        debug!(
            "Synthesized {} chars (confidence {:.2})",
            text.len(),
            confidence
        );

        Ok(SynthesizedAnswer { text, confidence })
    }

    /// Rewrite an answer to address the verifier's issues
    pub async fn improve(
        &self,
        query: &str,
        answer: &str,
        issues: &[String],
        context: &[ContextChunk],
    ) -> Result<SynthesizedAnswer, crate::ollama::OllamaError> {
        let issue_list: String = issues
            .iter()
            .map(|i| format!("- {}\n", i))
            .collect();
        let context_section = render_context(context);

        let prompt = format!(
            "You are reviewing your own answer to a question about a codebase.\n\n\
             Question: {query}\n\n\
             Previous answer:\n{answer}\n\n\
             Identified issues:\n{issue_list}\n\
             {context_section}\
             Rewrite the answer to address every issue. Reply with the improved \
             answer only."
        );

        let text = self.generate(&prompt).await?;
        let confidence = answer_confidence(&text, context.len(), 0);
        Ok(SynthesizedAnswer { text, confidence })
    }

    async fn generate(&self, prompt: &str) -> Result<String, crate::ollama::OllamaError> {
        let options = GenerateOptions {
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            num_predict: self.generation.max_tokens,
            // Stop before the model invents further conversation turns
            stop: vec!["\nUser:".to_string(), "\nQuestion:".to_string()],
        };
        self.ollama.generate(&self.model, prompt, &options).await
    }
}

#[async_trait]
impl Agent for Synthesizer {
    type Task = SynthesizerTask;
    type Output = SynthesizedAnswer;

    fn name(&self) -> &'static str {
        "synthesizer"
    }

    async fn handle(&self, task: Self::Task) -> AgentResponse<Self::Output> {
        let start = Instant::now();
        let result = match task {
            SynthesizerTask::Synthesize {
                query,
                context,
                tools,
                history,
                complexity,
            } => {
                self.synthesize(&query, &context, &tools, &history, complexity)
                    .await
            }
            SynthesizerTask::Improve {
                query,
                answer,
                issues,
                context,
            } => self.improve(&query, &answer, &issues, &context).await,
        };

        match result {
            Ok(answer) => {
                let confidence = answer.confidence;
                AgentResponse::ok(answer)
                    .with_confidence(confidence)
                    .with_execution_time(start.elapsed().as_millis() as u64)
            }
            Err(e) => {
                warn!("Synthesis failed: {}", e);
                AgentResponse::err(e.to_string())
                    .with_execution_time(start.elapsed().as_millis() as u64)
            }
        }
    }
}

/// System prompt with three content gates: context present, tools
/// present, complexity above 0.7
fn build_prompt(
    query: &str,
    context: &[ContextChunk],
    tools: &[ToolCall],
    history: &[ConversationTurn],
    complexity: f32,
) -> String {
    let mut prompt = String::from(
        "You are a precise assistant answering questions about a code corpus. \
         Ground every claim in the provided context and say so when the context \
         is insufficient.\n",
    );

    if !context.is_empty() {
        prompt.push_str(&format!(
            "You have {} context sections retrieved from the corpus; cite them \
             by index when relevant.\n",
            context.len()
        ));
    }

    if !tools.is_empty() {
        prompt.push_str("Analysis tools applied to this query:\n");
        for tool in tools {
            prompt.push_str(&format!(
                "- {}: {}\n",
                tool.name,
                tool_description(&tool.name)
            ));
        }
    }

    if complexity > 0.7 {
        prompt.push_str(
            "Structure the response as: 1) overview, 2) detailed analysis, \
             3) examples, 4) recommendations, 5) next steps.\n",
        );
    }

    prompt.push('\n');
    prompt.push_str(&render_context(context));

    let tool_results: Vec<&ToolCall> = tools.iter().filter(|t| t.result.is_some()).collect();
    if !tool_results.is_empty() {
        prompt.push_str("Tool results:\n");
        for tool in tool_results {
            if let Some(result) = &tool.result {
                prompt.push_str(&format!("- {}: {}\n", tool.name, result));
            }
        }
        prompt.push('\n');
    }

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    if !recent.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for turn in recent {
            let role = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", role, turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", query));
    prompt
}

fn render_context(context: &[ContextChunk]) -> String {
    if context.is_empty() {
        return String::new();
    }

    let mut section = String::from("Code context:\n");
    for (index, chunk) in context.iter().enumerate() {
        section.push_str(&format!(
            "[{}] {} (lines {}-{}):\n{}\n\n",
            index + 1,
            chunk.filename,
            chunk.line_range.0,
            chunk.line_range.1,
            chunk.content
        ));
    }
    section
}

fn tool_description(name: &str) -> &'static str {
    TOOL_DESCRIPTIONS
        .iter()
        .find(|(tool, _)| *tool == name)
        .map(|(_, description)| *description)
        .unwrap_or(DEFAULT_TOOL_DESCRIPTION)
}

/// Length, context, tool and code-block heuristic in [0, 1]
fn answer_confidence(text: &str, context_count: usize, tool_count: usize) -> f32 {
    let mut confidence = 0.5;
    if text.len() > 500 {
        confidence += 0.1;
    }
    if text.len() > 1000 {
        confidence += 0.1;
    }
    confidence += 0.05 * context_count.min(4) as f32;
    confidence += 0.05 * tool_count.min(3) as f32;
    if text.contains("```") {
        confidence += 0.1;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn chunk(filename: &str) -> ContextChunk {
        ContextChunk {
            content: "fn sample() {}".to_string(),
            filename: filename.to_string(),
            line_range: (1, 5),
            relevance_score: 0.8,
            metadata: HashMap::new(),
        }
    }

    fn tool(name: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            parameters: serde_json::Value::Null,
            result: None,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_prompt_gates() {
        let bare = build_prompt("what is this", &[], &[], &[], 0.4);
        assert!(!bare.contains("context sections"));
        assert!(!bare.contains("Analysis tools"));
        assert!(!bare.contains("overview"));

        let full = build_prompt(
            "what is this",
            &[chunk("a.rs"), chunk("b.rs")],
            &[tool("debug_assistant")],
            &[],
            0.9,
        );
        assert!(full.contains("You have 2 context sections"));
        assert!(full.contains("debug_assistant: isolates likely failure causes"));
        assert!(full.contains("1) overview"));
    }

    #[test]
    fn test_unknown_tool_gets_default_description() {
        assert_eq!(tool_description("mystery_tool"), DEFAULT_TOOL_DESCRIPTION);
        assert_ne!(tool_description("code_search"), DEFAULT_TOOL_DESCRIPTION);
    }

    #[test]
    fn test_prompt_limits_history_to_last_four_turns() {
        let history: Vec<ConversationTurn> = (0..6)
            .map(|i| ConversationTurn {
                role: TurnRole::User,
                content: format!("turn-{}", i),
            })
            .collect();

        let prompt = build_prompt("question", &[], &[], &history, 0.3);
        assert!(!prompt.contains("turn-0"));
        assert!(!prompt.contains("turn-1"));
        assert!(prompt.contains("turn-2"));
        assert!(prompt.contains("turn-5"));
    }

    #[test]
    fn test_answer_confidence_heuristic() {
        assert!((answer_confidence("short", 0, 0) - 0.5).abs() < 1e-6);

        let long = "x".repeat(1200);
        let with_code = format!("{}\n```rust\nfn f() {{}}\n```", long);
        let confidence = answer_confidence(&with_code, 6, 5);
        // 0.5 + 0.1 + 0.1 + 0.2 + 0.15 + 0.1 = 1.15 clamped
        assert_eq!(confidence, 1.0);
    }

    #[tokio::test]
    async fn test_endpoint_failure_surfaces_error() {
        let ollama = Arc::new(
            OllamaClient::new("http://localhost:1", Duration::from_millis(200)).unwrap(),
        );
        let synthesizer = Synthesizer::new(ollama, "test-model", GenerationConfig::default());

        let response = synthesizer
            .handle(SynthesizerTask::Synthesize {
                query: "q".to_string(),
                context: vec![],
                tools: vec![],
                history: vec![],
                complexity: 0.3,
            })
            .await;

        assert!(!response.success);
        assert!(response.data.is_none());
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_synthesize_against_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(
                serde_json::json!({"response": "The parser uses recursive descent.", "done": true})
                    .to_string(),
            )
            .create_async()
            .await;

        let ollama =
            Arc::new(OllamaClient::new(&server.url(), Duration::from_secs(2)).unwrap());
        let synthesizer = Synthesizer::new(ollama, "test-model", GenerationConfig::default());

        let answer = synthesizer
            .synthesize("how does parsing work", &[chunk("parser.rs")], &[], &[], 0.4)
            .await
            .unwrap();

        assert_eq!(answer.text, "The parser uses recursive descent.");
        assert!(answer.confidence >= 0.5);
    }
}
