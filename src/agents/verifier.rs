//! Answer verifier
//!
//! Runs five independent quality checks against a synthesized answer,
//! combines them with fixed weights and, when the overall confidence
//! falls below threshold, asks the synthesizer for exactly one improved
//! rewrite. Improvement failure is non-fatal: the original answer stays.

use super::models::{ContextChunk, SynthesizedAnswer, VerificationResult};
use super::synthesizer::Synthesizer;
use super::{Agent, AgentResponse};
use crate::config::VerifierConfig;
use crate::metrics::METRICS;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Context sections forwarded to the improvement prompt
const IMPROVE_CONTEXT_LIMIT: usize = 3;

const CONTRADICTION_TOKENS: &[&str] = &["never", "always", "impossible", "cannot", "must not"];

const TRANSITION_WORDS: &[&str] = &["first", "then", "next", "finally", "additionally", "however"];

/// Antonym pairs checked across the answer/context boundary
const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("true", "false"),
    ("yes", "no"),
    ("can", "cannot"),
    ("will", "will not"),
    ("is", "is not"),
];

/// Known-true programming-fact patterns the answer can match
const FACT_PATTERNS: &[(&str, &str)] = &[
    ("function", "return"),
    ("class", "instance"),
    ("import", "module"),
    ("async", "await"),
];

/// camelCase, snake_case and CONSTANT_CASE tokens
static TECHNICAL_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[a-z]+(?:[A-Z][a-z0-9]*)+|[a-z0-9]+(?:_[a-z0-9]+)+|[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+)\b")
        .unwrap()
});

/// Closed task set for the verifier
#[derive(Debug, Clone)]
pub enum VerifierTask {
    Verify {
        query: String,
        answer: SynthesizedAnswer,
        context: Vec<ContextChunk>,
    },
}

/// The verifier's output: the (possibly improved) answer plus scores
#[derive(Debug, Clone)]
pub struct VerifiedAnswer {
    pub answer: SynthesizedAnswer,
    pub verification: VerificationResult,
}

/// Verifier stage
pub struct Verifier {
    synthesizer: Arc<Synthesizer>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(synthesizer: Arc<Synthesizer>, config: VerifierConfig) -> Self {
        Self {
            synthesizer,
            config,
        }
    }

    /// Score the answer; improve it once when below threshold
    pub async fn verify(
        &self,
        query: &str,
        answer: SynthesizedAnswer,
        context: &[ContextChunk],
    ) -> VerifiedAnswer {
        let mut verification = self.score(query, &answer.text, context);

        debug!(
            "Verification scores: relevance {:.2}, accuracy {:.2}, completeness {:.2}, \
             code validity {:.2}, consistency {:.2} -> overall {:.2}",
            verification.relevance,
            verification.accuracy,
            verification.completeness,
            verification.code_validity,
            verification.consistency,
            verification.overall_confidence
        );

        if verification.overall_confidence >= self.config.improvement_threshold {
            return VerifiedAnswer {
                answer,
                verification,
            };
        }

        info!(
            "Answer confidence {:.2} below threshold {:.2}; attempting one improvement",
            verification.overall_confidence, self.config.improvement_threshold
        );
        METRICS.improvement_attempts.inc();

        let limited = &context[..context.len().min(IMPROVE_CONTEXT_LIMIT)];
        match self
            .synthesizer
            .improve(query, &answer.text, &verification.issues, limited)
            .await
        {
            Ok(improved) => {
                verification.improved = true;
                VerifiedAnswer {
                    answer: improved,
                    verification,
                }
            }
            Err(e) => {
                warn!("Improvement attempt failed, keeping original answer: {}", e);
                METRICS.improvement_failures.inc();
                VerifiedAnswer {
                    answer,
                    verification,
                }
            }
        }
    }

    /// Run the five checks and assemble the issue list
    fn score(&self, query: &str, answer: &str, context: &[ContextChunk]) -> VerificationResult {
        let relevance = check_relevance(query, answer);
        let accuracy = check_accuracy(answer, context);
        let completeness = check_completeness(query, answer);
        let code_validity = check_code_validity(answer);
        let consistency = check_consistency(answer, context);

        let [w_rel, w_acc, w_com, w_code, w_con] = self.config.weights;
        let overall_confidence = w_rel * relevance
            + w_acc * accuracy
            + w_com * completeness
            + w_code * code_validity
            + w_con * consistency;

        let mut issues = Vec::new();
        if relevance < 0.6 {
            issues.push("Answer may not directly address the query".to_string());
        }
        if accuracy < 0.6 {
            issues.push("Potential accuracy concerns detected".to_string());
        }
        if completeness < 0.6 {
            issues.push("Answer may be incomplete".to_string());
        }
        if code_validity < 0.8 {
            issues.push("Code examples may have issues".to_string());
        }
        if consistency < 0.6 {
            issues.push("Answer may be inconsistent with the provided context".to_string());
        }

        VerificationResult {
            relevance,
            accuracy,
            completeness,
            code_validity,
            consistency,
            overall_confidence,
            issues,
            improved: false,
        }
    }
}

#[async_trait]
impl Agent for Verifier {
    type Task = VerifierTask;
    type Output = VerifiedAnswer;

    fn name(&self) -> &'static str {
        "verifier"
    }

    async fn handle(&self, task: Self::Task) -> AgentResponse<Self::Output> {
        let start = Instant::now();
        match task {
            VerifierTask::Verify {
                query,
                answer,
                context,
            } => {
                let verified = self.verify(&query, answer, &context).await;
                let confidence = verified.verification.overall_confidence;
                AgentResponse::ok(verified)
                    .with_confidence(confidence)
                    .with_execution_time(start.elapsed().as_millis() as u64)
            }
        }
    }
}

fn keywords_of(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() >= 4)
        .map(|w| w.to_string())
        .collect()
}

/// Keyword overlap plus question-word-specific patterns
fn check_relevance(query: &str, answer: &str) -> f32 {
    let query_keywords = keywords_of(query);
    let answer_lower = answer.to_lowercase();

    let overlap = if query_keywords.is_empty() {
        0.5
    } else {
        let matched = query_keywords
            .iter()
            .filter(|k| answer_lower.contains(k.as_str()))
            .count();
        matched as f32 / query_keywords.len() as f32
    };

    let mut score = 0.6 * overlap;

    let query_lower = query.to_lowercase();
    let pattern_hit = (query_lower.starts_with("how")
        && ["by ", "through ", "using "].iter().any(|p| answer_lower.contains(p)))
        || (query_lower.starts_with("why")
            && ["because", "due to", "since "].iter().any(|p| answer_lower.contains(p)))
        || (query_lower.starts_with("what")
            && ["is ", "are ", "refers"].iter().any(|p| answer_lower.contains(p)))
        || (query_lower.starts_with("where")
            && ["in ", "at ", "located"].iter().any(|p| answer_lower.contains(p)));
    if pattern_hit {
        score += 0.2;
    }

    if (100..2000).contains(&answer.len()) {
        score += 0.1;
    }

    let code_requiring = ["example", "code", "implement", "write", "snippet"]
        .iter()
        .any(|w| query_lower.contains(w));
    if code_requiring && answer.contains("```") {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// Contradiction tokens, known-fact patterns and technical pairings
fn check_accuracy(answer: &str, context: &[ContextChunk]) -> f32 {
    let answer_lower = answer.to_lowercase();
    let context_lower: String = context
        .iter()
        .map(|c| c.content.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    let mut score: f32 = 0.7;

    for token in CONTRADICTION_TOKENS {
        if answer_lower.contains(token) && context_lower.contains(token) {
            score -= 0.05;
        }
    }

    if FACT_PATTERNS
        .iter()
        .any(|(a, b)| answer_lower.contains(a) && answer_lower.contains(b))
    {
        score += 0.1;
    }

    let technical_pairs = [("function", "return"), ("class", "constructor"), ("import", "export")];
    if technical_pairs
        .iter()
        .any(|(a, b)| answer_lower.contains(a) && answer_lower.contains(b))
    {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// Clause coverage for multi-clause queries, fixed 0.8 otherwise
fn check_completeness(query: &str, answer: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let answer_lower = answer.to_lowercase();

    let clauses: Vec<&str> = query_lower
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != ' ')
        .flat_map(|part| part.split(" and "))
        .flat_map(|part| part.split(" or "))
        .flat_map(|part| part.split(" also "))
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .collect();

    let mut score = if clauses.len() > 1 {
        let covered = clauses
            .iter()
            .filter(|clause| {
                let clause_keywords = keywords_of(clause);
                !clause_keywords.is_empty()
                    && clause_keywords
                        .iter()
                        .any(|k| answer_lower.contains(k.as_str()))
            })
            .count();
        covered as f32 / clauses.len() as f32
    } else {
        0.8
    };

    if answer.len() > 300 {
        score += 0.1;
    }
    if answer_lower.contains("example") || answer.contains("```") {
        score += 0.1;
    }
    if TRANSITION_WORDS.iter().any(|w| answer_lower.contains(w)) {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

/// Fraction of fenced code blocks with balanced brackets and quotes
fn check_code_validity(answer: &str) -> f32 {
    let blocks = extract_code_blocks(answer);
    if blocks.is_empty() {
        return 0.8;
    }

    let valid = blocks.iter().filter(|b| block_is_valid(b)).count();
    valid as f32 / blocks.len() as f32
}

fn extract_code_blocks(answer: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut sections = answer.split("```");
    // Odd-indexed sections are inside fences
    sections.next();
    while let Some(block) = sections.next() {
        // Drop the language tag line if present
        let body = match block.split_once('\n') {
            Some((_, rest)) => rest,
            None => block,
        };
        blocks.push(body.to_string());
        sections.next();
    }
    blocks
}

fn block_is_valid(block: &str) -> bool {
    let mut parens = 0i32;
    let mut brackets = 0i32;
    let mut braces = 0i32;
    for c in block.chars() {
        match c {
            '(' => parens += 1,
            ')' => parens -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            '{' => braces += 1,
            '}' => braces -= 1,
            _ => {}
        }
    }
    if parens != 0 || brackets != 0 || braces != 0 {
        return false;
    }

    block.lines().all(|line| {
        line.matches('"').count() % 2 == 0 && line.matches('\'').count() % 2 == 0
    })
}

/// Shared technical-term ratio minus antonym-pair contradictions
fn check_consistency(answer: &str, context: &[ContextChunk]) -> f32 {
    let context_text: String = context
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let answer_terms: HashSet<&str> = TECHNICAL_TERM
        .find_iter(answer)
        .map(|m| m.as_str())
        .collect();
    let context_terms: HashSet<&str> = TECHNICAL_TERM
        .find_iter(&context_text)
        .map(|m| m.as_str())
        .collect();

    let ratio = if answer_terms.is_empty() {
        0.0
    } else {
        answer_terms.intersection(&context_terms).count() as f32 / answer_terms.len() as f32
    };

    let mut score = 0.5 + 0.4 * ratio;

    let answer_lower = answer.to_lowercase();
    let context_lower = context_text.to_lowercase();
    for (a, b) in ANTONYM_PAIRS {
        let straddles = (answer_lower.contains(a) && context_lower.contains(b))
            || (answer_lower.contains(b) && context_lower.contains(a));
        if straddles {
            score -= 0.1;
        }
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::ollama::OllamaClient;
    use std::collections::HashMap;
    use std::time::Duration;

    fn verifier_for(url: &str, threshold: f32) -> Verifier {
        let ollama = Arc::new(OllamaClient::new(url, Duration::from_millis(200)).unwrap());
        let synthesizer = Arc::new(Synthesizer::new(
            ollama,
            "test-model",
            GenerationConfig::default(),
        ));
        let config = VerifierConfig {
            improvement_threshold: threshold,
            ..VerifierConfig::default()
        };
        Verifier::new(synthesizer, config)
    }

    fn chunk(content: &str) -> ContextChunk {
        ContextChunk {
            content: content.to_string(),
            filename: "a.rs".to_string(),
            line_range: (1, 5),
            relevance_score: 0.8,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_unbalanced_code_block_lowers_validity_and_flags_issue() {
        let verifier = verifier_for("http://localhost:1", 0.0);
        let answer = "Here:\n```js\nfunction f() { return 1;\n```";
        let result = verifier.score("show me code", answer, &[]);

        assert!(result.code_validity < 0.8);
        assert!(result
            .issues
            .contains(&"Code examples may have issues".to_string()));
    }

    #[test]
    fn test_balanced_code_block_is_valid() {
        assert_eq!(check_code_validity("```rust\nfn f() { 1 }\n```"), 1.0);
        assert_eq!(check_code_validity("no code at all"), 0.8);
    }

    #[test]
    fn test_weighted_sum_with_uniform_scores() {
        // Force every check to 0.9 and confirm the weighted sum
        let config = VerifierConfig::default();
        let [a, b, c, d, e] = config.weights;
        let overall = (a + b + c + d + e) * 0.9;
        assert!((overall - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_rewards_overlap_and_patterns() {
        let low = check_relevance("how does caching work", "unrelated text entirely");
        let high = check_relevance(
            "how does caching work",
            "Caching work happens by storing entries keyed through their hash. \
             The cache layer checks membership before recomputing anything at all.",
        );
        assert!(high > low);
    }

    #[test]
    fn test_completeness_covers_clauses() {
        let partial = check_completeness("explain parsing and explain rendering", "parsing uses a grammar");
        let full = check_completeness(
            "explain parsing and explain rendering",
            "parsing uses a grammar; rendering walks the tree",
        );
        assert!(full > partial);
    }

    #[test]
    fn test_consistency_uses_shared_technical_terms() {
        let context = [chunk("fn retry_request() { MAX_RETRIES }")];
        let aligned = check_consistency("The retry_request helper honors MAX_RETRIES.", &context);
        let unrelated = check_consistency("The render_frame path uses FRAME_BUDGET.", &context);
        assert!(aligned > unrelated);
    }

    #[tokio::test]
    async fn test_high_confidence_skips_improvement() {
        // Threshold 0 means no improvement call; unreachable endpoint proves it
        let verifier = verifier_for("http://localhost:1", 0.0);
        let answer = SynthesizedAnswer {
            text: "plain answer".to_string(),
            confidence: 0.6,
        };

        let verified = verifier.verify("a question", answer.clone(), &[]).await;
        assert_eq!(verified.answer.text, answer.text);
        assert!(!verified.verification.improved);
    }

    #[tokio::test]
    async fn test_failed_improvement_keeps_original_answer() {
        // Threshold 1.0 forces an improvement attempt against a dead endpoint
        let verifier = verifier_for("http://localhost:1", 1.0);
        let answer = SynthesizedAnswer {
            text: "original answer".to_string(),
            confidence: 0.6,
        };

        let verified = verifier.verify("a question", answer, &[]).await;
        assert_eq!(verified.answer.text, "original answer");
        assert!(!verified.verification.improved);
    }

    #[tokio::test]
    async fn test_improvement_replaces_answer_on_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(
                serde_json::json!({"response": "a better answer", "done": true}).to_string(),
            )
            .create_async()
            .await;

        let verifier = verifier_for(&server.url(), 1.0);
        let answer = SynthesizedAnswer {
            text: "weak answer".to_string(),
            confidence: 0.4,
        };

        let verified = verifier.verify("a question", answer, &[]).await;
        assert_eq!(verified.answer.text, "a better answer");
        assert!(verified.verification.improved);
    }
}
