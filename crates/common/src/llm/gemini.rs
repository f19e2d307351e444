//! Gemini `generateContent` client

use super::{ChatRole, ChatTurn, LlmClient};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for the Generative Language REST API
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    /// Create a new client
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn generate(&self, contents: Vec<Content<'_>>) -> Result<String> {
        let request = GenerateContentRequest { contents };

        let response = self.client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: GenerateContentResponse = response.json().await.map_err(|e| {
            AppError::LlmError {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        extract_text(result)
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(AppError::LlmError {
            message: format!("Empty response: {}", reason),
        });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AppError::LlmError {
            message: format!(
                "Response has no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }

    Ok(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(vec![Content {
            role: ChatRole::User.as_str(),
            parts: vec![Part { text: prompt }],
        }])
        .await
    }

    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String> {
        let mut contents: Vec<Content<'_>> = history
            .iter()
            .map(|turn| Content {
                role: turn.role.as_str(),
                parts: vec![Part { text: &turn.text }],
            })
            .collect();

        contents.push(Content {
            role: ChatRole::User.as_str(),
            parts: vec![Part { text: message }],
        });

        self.generate(contents).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::Uri, Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        uri: Arc<Mutex<Option<String>>>,
        body: Arc<Mutex<Option<Value>>>,
    }

    /// Serve `reply` for any request and remember what was sent
    async fn stub_server(reply: Value) -> (String, Captured) {
        let captured = Captured::default();

        let app = Router::new()
            .fallback(
                |State((captured, reply)): State<(Captured, Value)>,
                 uri: Uri,
                 Json(body): Json<Value>| async move {
                    *captured.uri.lock().unwrap() = Some(uri.to_string());
                    *captured.body.lock().unwrap() = Some(body);
                    Json(reply)
                },
            )
            .with_state((captured.clone(), reply));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn client_for(base_url: String) -> GeminiClient {
        let config = LlmConfig {
            base_url,
            model: "models/gemini-flash-latest".to_string(),
            ..LlmConfig::default()
        };
        GeminiClient::new(&config, "test-key".to_string()).unwrap()
    }

    fn reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_complete_sends_single_user_turn() {
        let (base_url, captured) = stub_server(reply("Hello there")).await;
        let client = client_for(base_url);

        let answer = client.complete("What is PM-KISAN?").await.unwrap();
        assert_eq!(answer, "Hello there");

        let uri = captured.uri.lock().unwrap().clone().unwrap();
        assert_eq!(uri, "/models/gemini-flash-latest:generateContent");

        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(
            body,
            json!({"contents": [{"role": "user", "parts": [{"text": "What is PM-KISAN?"}]}]})
        );
    }

    #[tokio::test]
    async fn test_chat_appends_message_after_history() {
        let (base_url, captured) = stub_server(reply("Apply at the taluk office")).await;
        let client = client_for(base_url);

        let history = vec![
            ChatTurn::new(ChatRole::User, "pension for farmers"),
            ChatTurn::new(ChatRole::Model, "There is one scheme..."),
        ];
        let answer = client.chat(&history, "where do I apply?").await.unwrap();
        assert_eq!(answer, "Apply at the taluk office");

        let body = captured.body.lock().unwrap().clone().unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "where do I apply?");
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_error() {
        let (base_url, _) = stub_server(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .await;
        let client = client_for(base_url);

        let err = client.complete("anything").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_multi_part_text_is_concatenated() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "ab");
    }
}
