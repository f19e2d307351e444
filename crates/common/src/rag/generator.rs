//! Response production: the LLM call and its single recovery policy

use crate::llm::{ChatTurn, LlmClient};
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, instrument};

/// Prefix of the answer returned when the LLM call fails
pub const LLM_ERROR_PREFIX: &str =
    "I apologize, but I encountered an error while processing your request:";

/// Outcome of a generation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Generation {
    /// The model answered
    Answer { text: String },

    /// The model call failed; `text` is the apology shown to the user
    Degraded { text: String, error: String },
}

impl Generation {
    fn degraded(error: String) -> Self {
        Generation::Degraded {
            text: format!("{} {}", LLM_ERROR_PREFIX, error),
            error,
        }
    }

    /// Text shown to the user, whatever the outcome
    pub fn text(&self) -> &str {
        match self {
            Generation::Answer { text } | Generation::Degraded { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Generation::Answer { text } | Generation::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Generation::Degraded { .. })
    }
}

/// Thin wrapper over the LLM that never fails
pub struct ResponseProducer {
    llm: Arc<dyn LlmClient>,
}

impl ResponseProducer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Single-turn completion when `history_window` is empty, otherwise a chat
    /// seeded with the window and `prompt_text` as the newest turn.
    #[instrument(skip_all, fields(model = self.llm.model_name(), history = history_window.len()))]
    pub async fn generate(&self, prompt_text: &str, history_window: &[ChatTurn]) -> Generation {
        let start = Instant::now();

        let result = if history_window.is_empty() {
            self.llm.complete(prompt_text).await
        } else {
            self.llm.chat(history_window, prompt_text).await
        };

        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_llm(elapsed, self.llm.model_name(), result.is_ok());

        match result {
            Ok(text) => Generation::Answer { text },
            Err(e) => {
                error!(error = %e, "LLM call failed, answering with apology");
                Generation::degraded(e.to_string())
            }
        }
    }
}
