//! Session management handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use schemebot_common::{
    db::models::{Message, Session, DEFAULT_SESSION_TITLE},
    errors::{AppError, Result},
};

/// Create session request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(max = 200))]
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: String,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            title: session.title,
            created_at: session.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            timestamp: message.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

/// Create a new chat session
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("title".to_string()),
    })?;

    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());

    let session = state.repo.create_session(&title).await?;

    tracing::info!(session_id = %session.id, "Session created");

    Ok(Json(session.into()))
}

/// List sessions, newest first
pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<SessionResponse>>> {
    let sessions = state.repo.list_sessions().await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// Messages of a session, oldest first. Unknown sessions have no messages.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<MessageResponse>>> {
    let messages = state.repo.session_messages(session_id).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Delete a session and its messages
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>> {
    let existed = state.repo.delete_session(session_id).await?;

    tracing::info!(session_id = %session_id, existed, "Session deleted");

    Ok(Json(DeleteResponse {
        message: "Session deleted successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_title_validation() {
        let ok = CreateSessionRequest { title: Some("Farm schemes".into()) };
        assert!(ok.validate().is_ok());

        let none = CreateSessionRequest::default();
        assert!(none.validate().is_ok());

        let long = CreateSessionRequest { title: Some("x".repeat(201)) };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_message_response_shape() {
        let created_at = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
            .unwrap();
        let message = Message {
            id: 7,
            session_id: Uuid::new_v4(),
            role: "assistant".into(),
            content: "Hello".into(),
            created_at,
        };

        let json = serde_json::to_value(MessageResponse::from(message)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["timestamp"], "2025-01-02T03:04:05+00:00");
    }
}
