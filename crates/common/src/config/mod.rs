//! Configuration management for SchemeBot services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Headroom for the database work around the pipeline in a chat turn
const STORAGE_MARGIN: Duration = Duration::from_secs(5);

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval and prompt tuning
    #[serde(default)]
    pub rag: RagConfig,

    /// Scheme corpus indexing
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Run pending migrations on connect
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai (any OpenAI-compatible endpoint), mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// LLM provider: gemini, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key (falls back to GEMINI_API_KEY)
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Retrieval cutoffs and history windows.
///
/// The defaults are product-tuned values; change them only deliberately.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RagConfig {
    /// Matches at or above this cosine distance are dropped
    #[serde(default = "default_distance_cutoff")]
    pub distance_cutoff: f64,

    /// Number of nearest documents requested from the index
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// How many trailing turns are scanned for user queries
    #[serde(default = "default_query_lookback_turns")]
    pub query_lookback_turns: usize,

    /// How many of those user queries are folded into the search query
    #[serde(default = "default_query_user_turns")]
    pub query_user_turns: usize,

    /// How many trailing turns are forwarded to the LLM as chat history
    #[serde(default = "default_history_window_turns")]
    pub history_window_turns: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Path to the scheme JSON file
    #[serde(default = "default_schemes_path")]
    pub schemes_path: String,

    /// Documents embedded and inserted per batch
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,

    /// Index the corpus from the gateway before serving
    #[serde(default = "default_enabled")]
    pub index_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 180 }
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
fn default_database_url() -> String { "postgres://localhost/schemebot".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 50 }
fn default_llm_provider() -> String { "gemini".to_string() }
fn default_llm_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_llm_model() -> String { "gemini-flash-latest".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_distance_cutoff() -> f64 { 1.5 }
fn default_top_k() -> usize { 10 }
fn default_query_lookback_turns() -> usize { 4 }
fn default_query_user_turns() -> usize { 2 }
fn default_history_window_turns() -> usize { 6 }
fn default_schemes_path() -> String { "data/schemes.json".to_string() }
fn default_index_batch_size() -> usize { 50 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "schemebot".to_string() }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Honour the plain `GEMINI_API_KEY` / `SCHEMES_JSON_PATH` variables
    /// when the namespaced keys are unset.
    fn apply_legacy_env(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if let Ok(path) = std::env::var("SCHEMES_JSON_PATH") {
            if !path.is_empty() {
                self.indexer.schemes_path = path;
            }
        }
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Worst case for the upstream calls of one chat turn: the query
    /// embedding with all its retries, then the LLM call.
    pub fn answer_budget(&self) -> Duration {
        self.embedding.worst_case() + Duration::from_secs(self.llm.timeout_secs)
    }

    /// The HTTP timeout must outlast the answer budget plus the storage
    /// round-trips, otherwise a slow LLM surfaces as a bare 408 instead of
    /// the apology answer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = self.answer_budget() + STORAGE_MARGIN;
        if self.request_timeout() <= required {
            return Err(ConfigError::Message(format!(
                "server.request_timeout_secs ({}s) must exceed embedding + LLM timeouts plus {}s ({:.1}s)",
                self.server.request_timeout_secs,
                STORAGE_MARGIN.as_secs(),
                required.as_secs_f64()
            )));
        }
        Ok(())
    }
}

impl EmbeddingConfig {
    /// Longest a single embedding call can take, retries and backoff included
    pub fn worst_case(&self) -> Duration {
        if self.provider != "openai" {
            return Duration::ZERO;
        }

        let attempts = self.max_retries.max(1);
        let backoff_ms: u64 = (1..attempts).map(|attempt| 100 * 2_u64.pow(attempt)).sum();

        Duration::from_secs(self.timeout_secs * u64::from(attempts)) + Duration::from_millis(backoff_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            distance_cutoff: default_distance_cutoff(),
            top_k: default_top_k(),
            query_lookback_turns: default_query_lookback_turns(),
            query_user_turns: default_query_user_turns(),
            history_window_turns: default_history_window_turns(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            schemes_path: default_schemes_path(),
            batch_size: default_index_batch_size(),
            index_on_startup: default_enabled(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            rag: RagConfig::default(),
            indexer: IndexerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
