//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub scheme_index: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn down(error: impl ToString) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            documents: None,
            error: Some(error.to_string()),
        }
    }
}

/// Service banner
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Government Schemes Chatbot API",
        status: "running",
    })
}

/// Liveness check - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: schemebot_common::VERSION,
    })
}

/// Readiness check - database reachable and scheme index populated
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let start = std::time::Instant::now();

    let db_check = match state.repo.ping().await {
        Ok(_) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            documents: None,
            error: None,
        },
        Err(e) => CheckResult::down(e),
    };

    let index_check = match state.repo.count_schemes().await {
        Ok(0) => CheckResult {
            status: "empty".to_string(),
            latency_ms: None,
            documents: Some(0),
            error: None,
        },
        Ok(n) => CheckResult {
            status: "up".to_string(),
            latency_ms: None,
            documents: Some(n),
            error: None,
        },
        Err(e) => CheckResult::down(e),
    };

    let all_healthy = db_check.status == "up" && index_check.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            database: db_check,
            scheme_index: index_check,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_banner() {
        let Json(body) = root().await;
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "Government Schemes Chatbot API",
                "status": "running"
            })
        );
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
    }

    #[test]
    fn test_down_check_omits_empty_fields() {
        let json = serde_json::to_value(CheckResult::down("refused")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "down", "error": "refused"}));
    }
}
