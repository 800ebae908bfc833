//! Pipeline orchestrator
//!
//! Drives the fixed stage order Enhance -> Fetch -> Plan -> Synthesize ->
//! Verify. Every transition appends two trace entries; a failing stage
//! aborts the remainder and yields a degraded response carrying the
//! partial trace. There is no pipeline-level retry.

use super::enhancer::{EnhancerTask, QueryEnhancer};
use super::fetcher::{ContextFetcher, FetcherTask};
use super::models::{ConversationTurn, PipelineResponse};
use super::planner::{Planner, PlannerTask};
use super::synthesizer::{Synthesizer, SynthesizerTask};
use super::verifier::{Verifier, VerifierTask};
use super::{Agent, AgentResponse, AgentTrace};
use crate::config::PipelineConfig;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::metrics::METRICS;
use crate::ollama::OllamaClient;
use std::sync::Arc;
use tracing::{error, info};

/// Owns the five stage instances and the shared index.
///
/// Changing either model identity rebuilds the stage instances; queries
/// already in flight finish under the configuration they started with.
pub struct Orchestrator {
    config: PipelineConfig,
    index: Arc<VectorIndex>,
    enhancer: QueryEnhancer,
    fetcher: ContextFetcher,
    planner: Planner,
    synthesizer: Arc<Synthesizer>,
    verifier: Verifier,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, index: Arc<VectorIndex>) -> Result<Self> {
        let ollama = Arc::new(OllamaClient::new(
            &config.endpoint_url,
            config.request_timeout(),
        )?);
        let embeddings = Arc::new(EmbeddingClient::new(
            ollama.clone(),
            config.embedding.clone(),
        ));

        let enhancer = QueryEnhancer::new(
            ollama.clone(),
            &config.generation_model,
            config.generation.clone(),
        );
        let fetcher = ContextFetcher::new(
            index.clone(),
            embeddings,
            &config.embedding_model,
            config.search.top_k,
        );
        let synthesizer = Arc::new(Synthesizer::new(
            ollama,
            &config.generation_model,
            config.generation.clone(),
        ));
        let verifier = Verifier::new(synthesizer.clone(), config.verifier.clone());

        Ok(Self {
            config,
            index,
            enhancer,
            fetcher,
            planner: Planner::new(),
            synthesizer,
            verifier,
        })
    }

    /// Rebuild the stage instances for a new pair of model identities.
    /// In-flight queries are not migrated.
    pub fn with_models(
        &self,
        generation_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self> {
        let mut config = self.config.clone();
        config.generation_model = generation_model.into();
        config.embedding_model = embedding_model.into();
        Self::new(config, self.index.clone())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one query through the full pipeline
    pub async fn process_query(
        &self,
        text: &str,
        history: &[ConversationTurn],
    ) -> PipelineResponse {
        let query_id = uuid::Uuid::new_v4().to_string();
        let mut trace = AgentTrace::new();
        info!("Processing query {} ({} chars)", query_id, text.len());

        // Enhance
        trace.record_start(self.enhancer.name());
        let response = self
            .enhancer
            .handle(EnhancerTask::Enhance {
                query: text.to_string(),
                history: history.to_vec(),
            })
            .await;
        let queries = match self.settle(self.enhancer.name(), response, &mut trace, |q: &Vec<String>| {
            format!("{} queries", q.len())
        }) {
            Some(queries) => queries,
            None => return self.degraded(&query_id, self.enhancer.name(), text, trace),
        };

        // Fetch
        trace.record_start(self.fetcher.name());
        let response = self
            .fetcher
            .handle(FetcherTask::Fetch {
                queries: queries.clone(),
                corpus_available: !self.index.is_empty(),
            })
            .await;
        let context = match self.settle(self.fetcher.name(), response, &mut trace, |c: &Vec<_>| {
            format!("{} context chunks", c.len())
        }) {
            Some(context) => context,
            None => return self.degraded(&query_id, self.fetcher.name(), text, trace),
        };

        // Plan
        trace.record_start(self.planner.name());
        let response = self
            .planner
            .handle(PlannerTask::Plan {
                query: text.to_string(),
                context: context.clone(),
                history: history.to_vec(),
            })
            .await;
        let plan = match self.settle(self.planner.name(), response, &mut trace, |p: &super::PlanOutput| {
            format!(
                "{} intent, {} tools",
                p.analysis.primary_type.as_str(),
                p.tools.len()
            )
        }) {
            Some(plan) => plan,
            None => return self.degraded(&query_id, self.planner.name(), text, trace),
        };

        // Synthesize
        trace.record_start(self.synthesizer.name());
        let response = self
            .synthesizer
            .handle(SynthesizerTask::Synthesize {
                query: text.to_string(),
                context: context.clone(),
                tools: plan.tools.clone(),
                history: history.to_vec(),
                complexity: plan.analysis.complexity,
            })
            .await;
        let answer = match self.settle(self.synthesizer.name(), response, &mut trace, |a: &super::SynthesizedAnswer| {
            format!("{} chars", a.text.len())
        }) {
            Some(answer) => answer,
            None => return self.degraded(&query_id, self.synthesizer.name(), text, trace),
        };

        // Verify
        trace.record_start(self.verifier.name());
        let response = self
            .verifier
            .handle(VerifierTask::Verify {
                query: text.to_string(),
                answer,
                context: context.clone(),
            })
            .await;
        let verified = match self.settle(self.verifier.name(), response, &mut trace, |v: &super::verifier::VerifiedAnswer| {
            format!("confidence {:.2}", v.verification.overall_confidence)
        }) {
            Some(verified) => verified,
            None => return self.degraded(&query_id, self.verifier.name(), text, trace),
        };

        METRICS.record_query(true);

        PipelineResponse {
            query_id,
            answer: verified.answer.text,
            context_used: context,
            tools_used: plan.tools,
            enhanced_queries: queries,
            trace,
            verification: Some(verified.verification),
        }
    }

    /// Record the outcome of one stage; `None` means the stage failed
    fn settle<T>(
        &self,
        stage: &str,
        response: AgentResponse<T>,
        trace: &mut AgentTrace,
        describe: impl Fn(&T) -> String,
    ) -> Option<T> {
        let elapsed = response.meta.execution_time_ms.unwrap_or(0);
        METRICS.record_stage(stage, elapsed as f64 / 1000.0);

        if response.success {
            if let Some(data) = response.data {
                trace.record_completed(stage, describe(&data), elapsed);
                return Some(data);
            }
        }

        let message = response
            .error
            .unwrap_or_else(|| "stage returned no data".to_string());
        error!("Stage {} failed: {}", stage, message);
        trace.record_error(stage, message, elapsed);
        METRICS.record_stage_failure(stage);
        None
    }

    /// Apologetic response naming the failed stage; partial trace kept
    fn degraded(
        &self,
        query_id: &str,
        stage: &str,
        query: &str,
        trace: AgentTrace,
    ) -> PipelineResponse {
        METRICS.record_query(false);
        PipelineResponse {
            query_id: query_id.to_string(),
            answer: format!(
                "I apologize, but the {} stage failed while working on this \
                 question, so I could not produce an answer. Please try again.",
                stage
            ),
            context_used: vec![],
            tools_used: vec![],
            enhanced_queries: vec![query.to_string()],
            trace,
            verification: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::index::VectorIndex;

    fn orchestrator_for(url: &str) -> Orchestrator {
        let config = PipelineConfig {
            endpoint_url: url.to_string(),
            request_timeout_ms: 300,
            ..PipelineConfig::default()
        };
        let index = Arc::new(VectorIndex::new(SearchConfig::default()));
        Orchestrator::new(config, index).unwrap()
    }

    #[tokio::test]
    async fn test_offline_synthesis_yields_degraded_response() {
        let orchestrator = orchestrator_for("http://localhost:1");
        let response = orchestrator.process_query("how does this work", &[]).await;

        assert!(response.answer.contains("synthesizer"));
        assert!(response.context_used.is_empty());
        assert!(response.tools_used.is_empty());
        assert_eq!(response.enhanced_queries, vec!["how does this work"]);
        assert!(response.verification.is_none());

        // Trace ends with the synthesizer error; no verifier entries follow
        let entries = response.trace.entries();
        let last = entries.last().unwrap();
        assert_eq!(last.agent_name, "synthesizer");
        assert_eq!(last.status, super::super::TraceStatus::Error);
        assert!(!entries.iter().any(|e| e.agent_name == "verifier"));
    }

    #[tokio::test]
    async fn test_with_models_rebuilds_configuration() {
        let orchestrator = orchestrator_for("http://localhost:1");
        let rebuilt = orchestrator.with_models("other-gen", "other-embed").unwrap();

        assert_eq!(rebuilt.config().generation_model, "other-gen");
        assert_eq!(rebuilt.config().embedding_model, "other-embed");
        assert_eq!(
            orchestrator.config().generation_model,
            PipelineConfig::default().generation_model
        );
    }
}
