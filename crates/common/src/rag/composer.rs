//! Search query composition from conversational context

use super::types::{Role, Turn};
use crate::config::RagConfig;

/// Folds the most recent user questions into the retrieval query so that
/// follow-ups ("where do I apply?") stay on the topic under discussion.
#[derive(Debug, Clone, Copy)]
pub struct QueryComposer {
    lookback_turns: usize,
    user_turns: usize,
}

impl QueryComposer {
    pub fn new(lookback_turns: usize, user_turns: usize) -> Self {
        Self { lookback_turns, user_turns }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.query_lookback_turns, config.query_user_turns)
    }

    /// Build the retrieval query for `current_query`.
    ///
    /// Scans the last `lookback_turns` turns, keeps the latest `user_turns`
    /// user messages among them (in order) and prepends them, space-joined.
    pub fn compose(&self, current_query: &str, history: &[Turn]) -> String {
        let start = history.len().saturating_sub(self.lookback_turns);
        let recent: Vec<&str> = history[start..]
            .iter()
            .filter(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
            .collect();

        let kept = &recent[recent.len().saturating_sub(self.user_turns)..];
        if kept.is_empty() {
            return current_query.to_string();
        }

        format!("{} {}", kept.join(" "), current_query)
    }
}

impl Default for QueryComposer {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// [`QueryComposer::compose`] with the default windows (4 turns, 2 user turns)
pub fn compose_query(current_query: &str, history: &[Turn]) -> String {
    QueryComposer::default().compose(current_query, history)
}
