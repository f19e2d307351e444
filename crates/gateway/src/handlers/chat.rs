//! Chat handler

use async_trait::async_trait;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use schemebot_common::{
    db::{models::DEFAULT_SESSION_TITLE, Repository},
    errors::{AppError, Result},
    rag::{RagPipeline, Role, Turn},
};

/// Characters of the first question kept as the session title
const TITLE_MAX_CHARS: usize = 50;

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: Uuid,
}

/// Session storage a chat turn needs
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn session_exists(&self, id: Uuid) -> Result<bool>;

    async fn create_session(&self, title: &str) -> Result<Uuid>;

    /// Turns of the session, oldest first
    async fn history(&self, id: Uuid) -> Result<Vec<Turn>>;

    async fn append(&self, id: Uuid, role: Role, content: &str) -> Result<()>;

    async fn set_title(&self, id: Uuid, title: &str) -> Result<()>;
}

#[async_trait]
impl ChatStore for Repository {
    async fn session_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.find_session(id).await?.is_some())
    }

    async fn create_session(&self, title: &str) -> Result<Uuid> {
        Ok(Repository::create_session(self, title).await?.id)
    }

    async fn history(&self, id: Uuid) -> Result<Vec<Turn>> {
        self.session_history(id).await
    }

    async fn append(&self, id: Uuid, role: Role, content: &str) -> Result<()> {
        self.add_message(id, role, content).await.map(|_| ())
    }

    async fn set_title(&self, id: Uuid, title: &str) -> Result<()> {
        self.update_session_title(id, title).await.map(|_| ())
    }
}

/// Session title derived from the first question
pub fn title_from_query(query: &str) -> String {
    if query.chars().count() > TITLE_MAX_CHARS {
        let head: String = query.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        query.to_string()
    }
}

/// Answer a question within a session, creating one when none is given
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    chat_turn(&state.repo, &state.pipeline, request).await.map(Json)
}

/// One chat turn.
///
/// The user turn is stored before the pipeline runs and the answer, degraded
/// or not, is stored as the assistant turn. A new session takes its title
/// from its first question.
pub async fn chat_turn(
    store: &dyn ChatStore,
    pipeline: &RagPipeline,
    request: ChatRequest,
) -> Result<ChatResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    if request.query.trim().is_empty() {
        return Err(AppError::Validation {
            message: "query must not be blank".to_string(),
            field: Some("query".to_string()),
        });
    }

    let session_id = match request.session_id {
        Some(id) => {
            if !store.session_exists(id).await? {
                return Err(AppError::SessionNotFound { id: id.to_string() });
            }
            id
        }
        None => store.create_session(DEFAULT_SESSION_TITLE).await?,
    };

    let history = store.history(session_id).await?;

    store.append(session_id, Role::User, &request.query).await?;

    let outcome = pipeline.answer(&request.query, &history).await;

    if outcome.generation.is_degraded() {
        tracing::warn!(session_id = %session_id, "Answer degraded to apology text");
    }

    let response = outcome.generation.into_text();
    store.append(session_id, Role::Assistant, &response).await?;

    if history.is_empty() {
        store.set_title(session_id, &title_from_query(&request.query)).await?;
    }

    tracing::info!(
        session_id = %session_id,
        search_query = %outcome.search_query,
        matches = outcome.matches_used,
        "Chat turn completed"
    );

    Ok(ChatResponse {
        response,
        session_id,
    })
}

/// In-memory doubles for exercising chat turns without a database
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use schemebot_common::llm::{ChatTurn, LlmClient};
    use schemebot_common::rag::{SchemeIndex, SearchResults};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Ordered record of store writes and model calls
    pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    pub(crate) struct MemoryChatStore {
        sessions: Mutex<HashMap<Uuid, (String, Vec<Turn>)>>,
        pub(crate) events: EventLog,
    }

    impl MemoryChatStore {
        pub(crate) fn new(events: EventLog) -> Self {
            Self {
                sessions: Mutex::new(HashMap::new()),
                events,
            }
        }

        pub(crate) fn insert_session(&self, title: &str, turns: Vec<Turn>) -> Uuid {
            let id = Uuid::new_v4();
            self.sessions
                .lock()
                .unwrap()
                .insert(id, (title.to_string(), turns));
            id
        }

        pub(crate) fn title(&self, id: Uuid) -> String {
            self.sessions.lock().unwrap()[&id].0.clone()
        }

        pub(crate) fn turns(&self, id: Uuid) -> Vec<Turn> {
            self.sessions.lock().unwrap()[&id].1.clone()
        }

        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn log(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl ChatStore for MemoryChatStore {
        async fn session_exists(&self, id: Uuid) -> Result<bool> {
            Ok(self.sessions.lock().unwrap().contains_key(&id))
        }

        async fn create_session(&self, title: &str) -> Result<Uuid> {
            self.log("create_session".to_string());
            Ok(self.insert_session(title, Vec::new()))
        }

        async fn history(&self, id: Uuid) -> Result<Vec<Turn>> {
            Ok(self.turns(id))
        }

        async fn append(&self, id: Uuid, role: Role, content: &str) -> Result<()> {
            self.log(format!("{}: {}", role, content));
            let mut sessions = self.sessions.lock().unwrap();
            let (_, turns) = sessions
                .get_mut(&id)
                .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;
            turns.push(Turn::new(role, content));
            Ok(())
        }

        async fn set_title(&self, id: Uuid, title: &str) -> Result<()> {
            self.log(format!("title: {}", title));
            let mut sessions = self.sessions.lock().unwrap();
            if let Some((current, _)) = sessions.get_mut(&id) {
                *current = title.to_string();
            }
            Ok(())
        }
    }

    /// Index with nothing in it
    pub(crate) struct EmptyIndex;

    #[async_trait]
    impl SchemeIndex for EmptyIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<SearchResults> {
            Ok(SearchResults::new(Vec::new(), Vec::new()))
        }
    }

    /// LLM double that logs each call and answers or fails
    pub(crate) struct ScriptedLlm {
        pub(crate) events: EventLog,
        pub(crate) fail: bool,
    }

    impl ScriptedLlm {
        fn reply(&self) -> Result<String> {
            self.events.lock().unwrap().push("llm".to_string());
            if self.fail {
                return Err(AppError::LlmError {
                    message: "quota exhausted".to_string(),
                });
            }
            Ok("You may be eligible for PM-KISAN.".to_string())
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.reply()
        }

        async fn chat(&self, _history: &[ChatTurn], _message: &str) -> Result<String> {
            self.reply()
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}
