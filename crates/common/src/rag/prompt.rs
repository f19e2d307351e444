//! Grounding prompt and history window assembly
//!
//! The strings here are what the model sees; keep them byte-for-byte stable.

use super::types::{RetrievedMatch, Role, Turn};
use crate::config::RagConfig;
use crate::llm::{ChatRole, ChatTurn};

/// Context used when no match survived the relevance cutoff
pub const NO_RELEVANT_SCHEMES: &str =
    "No highly relevant schemes found in the database for this query.";

const SYSTEM_RULES: &str = "You are a helpful assistant specializing in Indian government schemes, particularly for Tamil Nadu and all-India schemes. 
Your role is to provide accurate, detailed information about government schemes based ONLY on the context provided below.

CRITICAL RULES:
1. ONLY use information from the context provided below - DO NOT make up or add information
2. If the answer is not in the context, clearly state \"I don't have information about this in the provided schemes database\"
3. Be specific and cite exact scheme names from the context
4. When providing details, copy them accurately from the context (eligibility, benefits, application process)
5. Format your response in clear, well-structured markdown with tables where appropriate
6. If multiple relevant schemes are found, compare them to help the user choose
7. MAINTAIN CONVERSATION CONTEXT: If the user asks a follow-up question (like \"where do I apply?\" or \"what documents needed?\"), answer about the SAME schemes discussed in the previous messages, NOT about different schemes

Context from relevant government schemes:
";

const FOLLOW_UP_NOTE: &str = "\n\nNOTE: This is a follow-up question in an ongoing conversation. Make sure to answer about the schemes already being discussed, not new unrelated schemes.";

const CLOSING_INSTRUCTION: &str =
    "Please answer based ONLY on the schemes provided in the context above.";

/// Exact payload for the LLM call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    /// Sent as the final, current user turn
    pub prompt_text: String,

    /// Prior turns, oldest first
    pub history_window: Vec<ChatTurn>,
}

/// Render the retrieved matches as the context block
pub fn context_block(matches: &[RetrievedMatch]) -> String {
    if matches.is_empty() {
        return NO_RELEVANT_SCHEMES.to_string();
    }

    matches
        .iter()
        .map(|m| {
            format!(
                "--- Relevant Scheme {} (Relevance: {:.2}) ---\n{}",
                m.rank,
                m.relevance(),
                m.document
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler {
    history_window_turns: usize,
}

impl PromptAssembler {
    pub fn new(history_window_turns: usize) -> Self {
        Self { history_window_turns }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.history_window_turns)
    }

    pub fn assemble(
        &self,
        query: &str,
        matches: &[RetrievedMatch],
        history: &[Turn],
    ) -> AssembledPrompt {
        let note = if history.is_empty() { "" } else { FOLLOW_UP_NOTE };

        let prompt_text = format!(
            "{}\n\n{}\n\n---\n\nUser Question: {}{}\n\n{}",
            SYSTEM_RULES,
            context_block(matches),
            query,
            note,
            CLOSING_INSTRUCTION
        );

        AssembledPrompt {
            prompt_text,
            history_window: self.history_window(history),
        }
    }

    /// Last turns of `history`, mapped onto the model's user/model roles
    pub fn history_window(&self, history: &[Turn]) -> Vec<ChatTurn> {
        let start = history.len().saturating_sub(self.history_window_turns);
        history[start..]
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => ChatRole::User,
                    Role::Assistant => ChatRole::Model,
                };
                ChatTurn::new(role, turn.content.clone())
            })
            .collect()
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}
