//! SchemeBot API Gateway
//!
//! HTTP front end of the scheme assistant.
//! Handles:
//! - Chat turns through the retrieval-augmented pipeline
//! - Session and message history
//! - Scheme index bootstrap on startup
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use schemebot_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    embeddings::create_embedder,
    llm::create_llm_client,
    logging,
    metrics as app_metrics,
    rag::{PgVectorIndex, RagPipeline},
    schemes::SchemeIndexer,
    VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub pipeline: Arc<RagPipeline>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    logging::init_tracing(&config.observability);

    info!("Starting SchemeBot API Gateway v{}", VERSION);

    init_metrics(&config.observability)?;

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db);

    let embedder = create_embedder(&config.embedding)?;
    let llm = create_llm_client(&config.llm)?;

    if config.indexer.index_on_startup {
        let store = Arc::new(repo.clone());
        let indexer = SchemeIndexer::new(store, embedder.clone(), config.indexer.clone());
        match indexer.ensure_indexed(false).await {
            Ok(report) => info!(?report, "Scheme index ready"),
            // Serve anyway: retrieval degrades to an empty context
            Err(e) => warn!(error = %e, "Scheme indexing failed"),
        }
    }

    let index = Arc::new(PgVectorIndex::new(repo.clone(), embedder));
    let pipeline = Arc::new(RagPipeline::new(index, llm.clone(), &config.rag));

    info!(
        llm = llm.model_name(),
        top_k = config.rag.top_k,
        distance_cutoff = config.rag.distance_cutoff,
        "RAG pipeline ready"
    );

    let state = AppState { repo, pipeline };

    // Build the router
    let app = create_router(state, &config);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the Prometheus exporter; port 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("chat_duration_seconds".to_string()),
            app_metrics::CHAT_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("llm_duration_seconds".to_string()),
            app_metrics::CHAT_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("embedding_duration_seconds".to_string()),
            app_metrics::EMBEDDING_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("retrieval_duration_seconds".to_string()),
            app_metrics::EMBEDDING_BUCKETS,
        )?
        .install()?;

    app_metrics::register_metrics();
    info!("Metrics exporter listening on {}", addr);

    Ok(())
}

/// CORS for the configured browser origins, credentials allowed
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Create the main application router
fn create_router(state: AppState, config: &AppConfig) -> Router {
    let api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/session", post(handlers::sessions::create_session))
        .route("/sessions", get(handlers::sessions::list_sessions))
        .route("/session/{id}/messages", get(handlers::sessions::get_messages))
        .route("/session/{id}", delete(handlers::sessions::delete_session));

    let app = Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .with_state(state);

    with_layers(app, config)
}

/// Timeout, tracing, CORS and request-id layers around the routes
fn with_layers(app: Router, config: &AppConfig) -> Router {
    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    app.layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server.cors_origins))
        .layer(propagate_id)
        .layer(request_id)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use crate::handlers::chat::{
        chat_turn,
        testing::{EmptyIndex, EventLog, MemoryChatStore},
        ChatRequest, ChatResponse,
    };
    use schemebot_common::{
        errors::Result,
        llm::GeminiClient,
        rag::{Turn, LLM_ERROR_PREFIX},
    };
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    type ChatState = (Arc<MemoryChatStore>, Arc<RagPipeline>);

    async fn memory_chat(
        State((store, pipeline)): State<ChatState>,
        Json(request): Json<ChatRequest>,
    ) -> Result<Json<ChatResponse>> {
        chat_turn(store.as_ref(), &pipeline, request).await.map(Json)
    }

    /// Model endpoint that accepts the request and never answers in time
    async fn hanging_llm() -> String {
        let app = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn banner_app(origins: &[String]) -> Router {
        Router::new()
            .route("/", get(handlers::health::root))
            .layer(cors_layer(origins))
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let origins = AppConfig::default().server.cors_origins;
        let response = banner_app(&origins)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_cors_rejects_unknown_origin() {
        let origins = AppConfig::default().server.cors_origins;
        let response = banner_app(&origins)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_invalid_origin_is_skipped() {
        let origins = vec!["bad\norigin".to_string(), "http://localhost:3000".to_string()];
        let response = banner_app(&origins)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_slow_llm_gets_apology_not_request_timeout() {
        let mut config = AppConfig::default();
        config.embedding.provider = "mock".to_string();
        config.llm.base_url = hanging_llm().await;
        config.llm.timeout_secs = 1;

        config.server.request_timeout_secs = 1;
        assert!(config.validate().is_err());
        config.server.request_timeout_secs = 7;
        config.validate().unwrap();

        let llm = Arc::new(GeminiClient::new(&config.llm, "test-key".to_string()).unwrap());
        let pipeline = Arc::new(RagPipeline::new(Arc::new(EmptyIndex), llm, &config.rag));
        let store = Arc::new(MemoryChatStore::new(EventLog::default()));

        let app = Router::new()
            .route("/api/chat", post(memory_chat))
            .with_state((store.clone(), pipeline));

        let response = with_layers(app, &config)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"query": "schemes for farmers"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let answer = json["response"].as_str().unwrap();
        assert!(answer.starts_with(LLM_ERROR_PREFIX));

        let session_id: Uuid = json["session_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(
            store.turns(session_id),
            vec![Turn::user("schemes for farmers"), Turn::assistant(answer)]
        );
    }
}
