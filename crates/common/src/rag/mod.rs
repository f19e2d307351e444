//! Retrieval-augmented generation core
//!
//! Per request the stages run strictly in order:
//! 1. [`QueryComposer`] folds recent user turns into the search query
//! 2. [`Retriever`] searches the scheme index and drops weak matches
//! 3. [`PromptAssembler`] renders the grounding prompt and history window
//! 4. [`ResponseProducer`] calls the LLM, turning failures into an apology
//!
//! [`RagPipeline`] wires the four together. Nothing here keeps state between
//! requests; conversation history is passed in by the caller.

mod composer;
mod generator;
mod pipeline;
mod prompt;
mod retriever;
mod types;

pub use composer::{compose_query, QueryComposer};
pub use generator::{Generation, ResponseProducer, LLM_ERROR_PREFIX};
pub use pipeline::{PipelineOutcome, RagPipeline};
pub use prompt::{context_block, AssembledPrompt, PromptAssembler, NO_RELEVANT_SCHEMES};
pub use retriever::{filter_matches, PgVectorIndex, Retriever, SchemeIndex, SearchResults};
pub use types::{ConversationHistory, RetrievedMatch, Role, Turn};
