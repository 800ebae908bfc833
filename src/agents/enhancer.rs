//! Query enhancer
//!
//! Expands one user question into several semantically and technically
//! diverse search queries. Four independent generators run concurrently;
//! the LLM-backed ones each fall back to a deterministic rule-based
//! generator, so the stage never returns fewer than the original query.

use super::models::ConversationTurn;
use super::{Agent, AgentResponse};
use crate::config::GenerationConfig;
use crate::ollama::{GenerateOptions, OllamaClient};
use async_trait::async_trait;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum queries returned, original included
const MAX_QUERIES: usize = 8;

static STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "me", "of", "on", "or", "should", "that", "the", "this", "to", "was",
    "what", "when", "where", "which", "who", "why", "will", "with", "you",
];

static QUESTION_WORDS: &[&str] = &[
    "how", "what", "why", "where", "when", "which", "who", "does", "do", "is", "are", "can",
    "should", "could", "would",
];

/// Deterministic synonym substitution table for the paraphrase fallback
static SYNONYMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    table.insert("error", &["exception", "failure"]);
    table.insert("bug", &["defect", "issue"]);
    table.insert("function", &["method", "procedure"]);
    table.insert("create", &["implement", "build"]);
    table.insert("fix", &["resolve", "repair"]);
    table.insert("fast", &["performant", "optimized"]);
    table.insert("slow", &["inefficient", "bottleneck"]);
    table.insert("use", &["invoke", "call"]);
    table.insert("work", &["behave", "operate"]);
    table
});

/// Keyword-triggered static structural suggestions
static STRUCTURAL_TRIGGERS: &[(&[&str], &[&str])] = &[
    (
        &["file", "module"],
        &["file structure", "module organization", "import export"],
    ),
    (
        &["error", "bug", "crash", "fail"],
        &["error handling", "try catch exception", "error message"],
    ),
    (
        &["test", "spec"],
        &["test cases", "unit test", "assertion"],
    ),
    (
        &["performance", "slow", "speed"],
        &["performance optimization", "caching", "complexity"],
    ),
    (
        &["config", "setting", "option"],
        &["configuration", "environment variable", "default value"],
    ),
];

/// Closed task set for the query enhancer
#[derive(Debug, Clone)]
pub enum EnhancerTask {
    Enhance {
        query: String,
        history: Vec<ConversationTurn>,
    },
}

/// Query enhancer stage
pub struct QueryEnhancer {
    ollama: Arc<OllamaClient>,
    model: String,
    generation: GenerationConfig,
}

impl QueryEnhancer {
    pub fn new(ollama: Arc<OllamaClient>, model: impl Into<String>, generation: GenerationConfig) -> Self {
        Self {
            ollama,
            model: model.into(),
            generation,
        }
    }

    /// Produce up to eight search queries, original first
    pub async fn generate(&self, query: &str, history: &[ConversationTurn]) -> Vec<String> {
        let (paraphrases, technical, contextual) = futures::join!(
            self.semantic_paraphrases(query, history),
            self.technical_expansion(query),
            self.contextual_continuation(query, history),
        );
        let structural = structural_queries(query);

        let mut queries: IndexSet<String> = IndexSet::new();
        queries.insert(query.to_string());

        for candidate in paraphrases
            .into_iter()
            .chain(technical)
            .chain(contextual)
            .chain(structural)
        {
            let candidate = candidate.trim().to_string();
            if !candidate.is_empty() {
                queries.insert(candidate);
            }
            if queries.len() >= MAX_QUERIES {
                break;
            }
        }

        debug!("Enhanced query into {} variants", queries.len());
        queries.into_iter().collect()
    }

    /// LLM-backed paraphrasing with recent conversation turns as context
    async fn semantic_paraphrases(&self, query: &str, history: &[ConversationTurn]) -> Vec<String> {
        let recent: String = history
            .iter()
            .rev()
            .take(2)
            .rev()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Rephrase the following question about a codebase in 2 different ways. \
             Keep each rephrasing on its own line, with no numbering.\n\n\
             {}Question: {}",
            if recent.is_empty() {
                String::new()
            } else {
                format!("Recent conversation:\n{}\n\n", recent)
            },
            query
        );

        match self.call_llm(&prompt).await {
            Ok(text) => parse_query_lines(&text, 2),
            Err(e) => {
                warn!("Paraphrase generator fell back to synonym table: {}", e);
                synonym_paraphrases(query)
            }
        }
    }

    /// LLM-backed expansion into code-flavored search terms
    async fn technical_expansion(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            "List 2 short technical search terms for finding code related to this \
             question: function names, class names, or error-message fragments. \
             One per line, no numbering.\n\nQuestion: {}",
            query
        );

        match self.call_llm(&prompt).await {
            Ok(text) => parse_query_lines(&text, 2),
            Err(e) => {
                warn!("Technical generator fell back to keyword extraction: {}", e);
                keyword_query(query).into_iter().collect()
            }
        }
    }

    /// Continuation of the conversation thread; keyword splitting when
    /// there is no history to continue
    async fn contextual_continuation(&self, query: &str, history: &[ConversationTurn]) -> Vec<String> {
        if history.is_empty() {
            return vec![strip_question_words(query)];
        }

        let recent: String = history
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Given this conversation about a codebase:\n{}\n\n\
             Rewrite the follow-up question as a standalone search query. \
             Reply with the query only.\n\nFollow-up: {}",
            recent, query
        );

        match self.call_llm(&prompt).await {
            Ok(text) => parse_query_lines(&text, 1),
            Err(e) => {
                warn!("Contextual generator fell back to question stripping: {}", e);
                vec![strip_question_words(query)]
            }
        }
    }

    async fn call_llm(&self, prompt: &str) -> Result<String, crate::ollama::OllamaError> {
        let options = GenerateOptions {
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            num_predict: 128,
            stop: vec![],
        };
        self.ollama.generate(&self.model, prompt, &options).await
    }
}

#[async_trait]
impl Agent for QueryEnhancer {
    type Task = EnhancerTask;
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "query_enhancer"
    }

    async fn handle(&self, task: Self::Task) -> AgentResponse<Self::Output> {
        let start = Instant::now();
        match task {
            EnhancerTask::Enhance { query, history } => {
                let queries = self.generate(&query, &history).await;
                AgentResponse::ok(queries)
                    .with_execution_time(start.elapsed().as_millis() as u64)
            }
        }
    }
}

/// Parse LLM output lines into clean query candidates
fn parse_query_lines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|line| !line.is_empty() && line.len() <= 120)
        .take(limit)
        .collect()
}

/// Deterministic paraphrases from the synonym substitution table
fn synonym_paraphrases(query: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let words: Vec<&str> = query.split_whitespace().collect();

    for (index, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if let Some(substitutes) = SYNONYMS.get(lower.as_str()) {
            for substitute in substitutes.iter() {
                let mut variant = words.clone();
                variant[index] = substitute;
                variants.push(variant.join(" "));
            }
            break;
        }
    }

    variants
}

/// Stop-word-filtered keyword extraction; None when nothing survives
fn keyword_query(query: &str) -> Option<String> {
    let keywords: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();

    if keywords.is_empty() {
        None
    } else {
        Some(keywords.join(" "))
    }
}

/// Strip leading question words and trailing punctuation
fn strip_question_words(query: &str) -> String {
    let mut words: Vec<&str> = query.split_whitespace().collect();
    while let Some(first) = words.first() {
        let lower = first.to_lowercase();
        if QUESTION_WORDS.contains(&lower.as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }
    words.join(" ").trim_end_matches(['?', '.', '!']).to_string()
}

/// Keyword-triggered static structural suggestions
fn structural_queries(query: &str) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut suggestions = Vec::new();

    for (triggers, queries) in STRUCTURAL_TRIGGERS {
        if triggers.iter().any(|t| query_lower.contains(t)) {
            suggestions.extend(queries.iter().map(|q| q.to_string()));
        }
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn offline_enhancer(url: &str) -> QueryEnhancer {
        let ollama = Arc::new(OllamaClient::new(url, Duration::from_millis(200)).unwrap());
        QueryEnhancer::new(ollama, "test-model", GenerationConfig::default())
    }

    #[tokio::test]
    async fn test_offline_enhancement_keeps_original_first() {
        let enhancer = offline_enhancer("http://localhost:1");
        let queries = enhancer.generate("how does the error handling work", &[]).await;

        assert_eq!(queries[0], "how does the error handling work");
        assert!(!queries.is_empty());
        assert!(queries.len() <= MAX_QUERIES);
    }

    #[tokio::test]
    async fn test_offline_enhancement_has_no_duplicates() {
        let enhancer = offline_enhancer("http://localhost:1");
        let queries = enhancer.generate("module file structure", &[]).await;

        let mut unique: Vec<&String> = queries.iter().collect();
        unique.dedup();
        assert_eq!(unique.len(), queries.len());
    }

    #[test]
    fn test_structural_triggers() {
        let queries = structural_queries("what files make up this module");
        assert!(queries.contains(&"file structure".to_string()));
        assert!(queries.contains(&"module organization".to_string()));

        assert!(structural_queries("completely unrelated text").is_empty());
    }

    #[test]
    fn test_synonym_paraphrases() {
        let variants = synonym_paraphrases("why does this error happen");
        assert_eq!(variants.len(), 2);
        assert!(variants[0].contains("exception"));
        assert!(variants[1].contains("failure"));
    }

    #[test]
    fn test_keyword_query_filters_stop_words() {
        let keywords = keyword_query("how does the parser handle comments").unwrap();
        assert_eq!(keywords, "parser handle comments");
        assert!(keyword_query("how does the a").is_none());
    }

    #[test]
    fn test_strip_question_words() {
        assert_eq!(
            strip_question_words("how does caching work?"),
            "caching work"
        );
        assert_eq!(strip_question_words("caching"), "caching");
    }

    #[test]
    fn test_parse_query_lines_cleans_bullets() {
        let parsed = parse_query_lines("- first query\n2. second query\n\n", 3);
        assert_eq!(parsed, vec!["first query", "second query"]);
    }
}
