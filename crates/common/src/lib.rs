//! SchemeBot Common Library
//!
//! Shared code for the SchemeBot services including:
//! - Retrieval-augmented generation core (query composition, retrieval,
//!   prompt assembly, response generation)
//! - Database models and repository patterns
//! - Embedding and LLM client abstractions
//! - Scheme corpus loading and indexing
//! - Error types, configuration, logging and metrics

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod rag;
pub mod schemes;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LlmClient;
pub use rag::RagPipeline;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
