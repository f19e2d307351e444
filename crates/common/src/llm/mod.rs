//! Language model abstraction
//!
//! The RAG core talks to the model through [`LlmClient`]: a single-turn
//! `complete` and a multi-turn `chat` seeded with prior turns.

mod gemini;
mod mock;

pub use gemini::GeminiClient;
pub use mock::MockLlm;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Speaker of a turn as the chat endpoint names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

/// One prior turn forwarded to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self { role, text: text.into() }
    }
}

/// Trait for text generation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-turn completion
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Continue a conversation seeded with `history`, sending `message` as the newest turn
    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an LLM client based on configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "Gemini API key required (llm.api_key or GEMINI_API_KEY)".to_string(),
            })?;
            Ok(Arc::new(GeminiClient::new(config, api_key)?))
        }
        "mock" => Ok(Arc::new(MockLlm::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_requires_key() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_llm_client(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_llm_client(&config).is_err());
    }

    #[test]
    fn test_mock_provider() {
        let config = LlmConfig {
            provider: "mock".to_string(),
            ..LlmConfig::default()
        };
        let client = create_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "mock-llm");
    }
}
