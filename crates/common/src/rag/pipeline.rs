//! End-to-end request pipeline

use super::composer::QueryComposer;
use super::generator::{Generation, ResponseProducer};
use super::prompt::PromptAssembler;
use super::retriever::{Retriever, SchemeIndex};
use super::types::Turn;
use crate::config::RagConfig;
use crate::llm::LlmClient;
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Result of answering one question
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Query sent to the index
    pub search_query: String,

    /// Matches that made it into the prompt
    pub matches_used: usize,

    pub generation: Generation,
}

/// Compose → retrieve → assemble → generate, built once at startup
pub struct RagPipeline {
    composer: QueryComposer,
    retriever: Retriever,
    assembler: PromptAssembler,
    producer: ResponseProducer,
}

impl RagPipeline {
    pub fn new(index: Arc<dyn SchemeIndex>, llm: Arc<dyn LlmClient>, config: &RagConfig) -> Self {
        Self {
            composer: QueryComposer::from_config(config),
            retriever: Retriever::new(index, config),
            assembler: PromptAssembler::from_config(config),
            producer: ResponseProducer::new(llm),
        }
    }

    /// Answer `query` given the session's prior turns (oldest first)
    #[instrument(skip_all, fields(history = history.len()))]
    pub async fn answer(&self, query: &str, history: &[Turn]) -> PipelineOutcome {
        let start = Instant::now();

        let search_query = self.composer.compose(query, history);
        let matches = self.retriever.retrieve(&search_query).await;
        let prompt = self.assembler.assemble(query, &matches, history);
        let generation = self
            .producer
            .generate(&prompt.prompt_text, &prompt.history_window)
            .await;

        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_chat(elapsed, generation.is_degraded());

        info!(
            matches = matches.len(),
            window = prompt.history_window.len(),
            degraded = generation.is_degraded(),
            latency_ms = (elapsed * 1000.0) as u64,
            "Answer generated"
        );

        PipelineOutcome {
            search_query,
            matches_used: matches.len(),
            generation,
        }
    }
}
