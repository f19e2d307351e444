//! Offline stand-in used when no model is configured

use super::{ChatTurn, LlmClient};
use crate::errors::Result;
use async_trait::async_trait;

/// Returns a canned answer that echoes the user's question
#[derive(Debug, Default, Clone)]
pub struct MockLlm;

impl MockLlm {
    pub fn new() -> Self {
        Self
    }

    fn respond(&self, prompt: &str) -> String {
        let question = prompt
            .lines()
            .find_map(|line| line.strip_prefix("User Question:"))
            .map(str::trim);

        match question {
            Some(q) => format!(
                "Based on the schemes provided, here is what I found about \"{}\".\n\n\
                [Mock response - LLM API key not configured]",
                q
            ),
            None => "[Mock response - LLM API key not configured]".to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        Ok(self.respond(prompt))
    }

    async fn chat(&self, _history: &[ChatTurn], message: &str) -> Result<String> {
        Ok(self.respond(message))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_question() {
        let llm = MockLlm::new();
        let answer = llm
            .complete("Context...\n\nUser Question: pension for farmers\n\nPlease answer")
            .await
            .unwrap();
        assert!(answer.contains("\"pension for farmers\""));
    }
}
