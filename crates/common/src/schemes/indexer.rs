//! Scheme indexer
//!
//! Embeds the flattened corpus and writes it to the scheme index. Indexing
//! is skipped when the index already holds documents. The file is loaded and
//! fully embedded before anything is written, and the write (including the
//! clear on a forced rebuild) is a single transaction.

use super::{load_schemes, SchemeDocument};
use crate::config::IndexerConfig;
use crate::db::Repository;
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Outcome of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexReport {
    /// The index already had `existing` documents
    AlreadyIndexed { existing: u64 },
    /// `indexed` documents were written
    Indexed { indexed: usize },
}

/// Storage side of the scheme index
#[async_trait]
pub trait SchemeStore: Send + Sync {
    async fn count_schemes(&self) -> Result<u64>;

    /// Atomically write `documents`; `replace` drops the previous index first
    async fn store_schemes(
        &self,
        documents: &[SchemeDocument],
        embeddings: &[Vec<f32>],
        embedding_model: &str,
        replace: bool,
    ) -> Result<usize>;
}

#[async_trait]
impl SchemeStore for Repository {
    async fn count_schemes(&self) -> Result<u64> {
        Repository::count_schemes(self).await
    }

    async fn store_schemes(
        &self,
        documents: &[SchemeDocument],
        embeddings: &[Vec<f32>],
        embedding_model: &str,
        replace: bool,
    ) -> Result<usize> {
        Repository::store_schemes(self, documents, embeddings, embedding_model, replace).await
    }
}

pub struct SchemeIndexer {
    store: Arc<dyn SchemeStore>,
    embedder: Arc<dyn Embedder>,
    config: IndexerConfig,
}

impl SchemeIndexer {
    pub fn new(store: Arc<dyn SchemeStore>, embedder: Arc<dyn Embedder>, config: IndexerConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Make sure the scheme index is populated.
    ///
    /// With `force` the existing index is rebuilt. It stays untouched when
    /// loading or embedding the corpus fails.
    #[instrument(skip(self), fields(path = %self.config.schemes_path))]
    pub async fn ensure_indexed(&self, force: bool) -> Result<IndexReport> {
        if !force {
            let existing = self.store.count_schemes().await?;
            if existing > 0 {
                info!(existing, "Schemes already indexed");
                return Ok(IndexReport::AlreadyIndexed { existing });
            }
        }

        info!("Loading and indexing schemes...");
        let documents = load_schemes(&self.config.schemes_path)?;
        let indexed = self.index_documents(&documents, force).await?;

        Ok(IndexReport::Indexed { indexed })
    }

    /// Embed `documents` in batches of `batch_size`, then write them in one go
    pub async fn index_documents(&self, documents: &[SchemeDocument], replace: bool) -> Result<usize> {
        let start = Instant::now();
        let total = documents.len();
        let mut embeddings = Vec::with_capacity(total);

        for batch in documents.chunks(self.config.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            embeddings.extend(self.embedder.embed_batch(&texts).await?);
            info!("Embedded {}/{} schemes...", embeddings.len(), total);
        }

        let written = self
            .store
            .store_schemes(documents, &embeddings, self.embedder.model_name(), replace)
            .await?;
        metrics::record_indexed(written);

        info!(
            total = written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            model = self.embedder.model_name(),
            "Successfully indexed schemes"
        );

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use crate::embeddings::MockEmbedder;
    use crate::errors::AppError;
    use std::io::Write;
    use std::sync::Mutex;

    /// In-memory index keeping document ids
    struct MemoryStore {
        ids: Mutex<Vec<String>>,
        writes: Mutex<Vec<bool>>,
    }

    impl MemoryStore {
        fn with(ids: &[&str]) -> Self {
            Self {
                ids: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn ids(&self) -> Vec<String> {
            self.ids.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchemeStore for MemoryStore {
        async fn count_schemes(&self) -> Result<u64> {
            Ok(self.ids.lock().unwrap().len() as u64)
        }

        async fn store_schemes(
            &self,
            documents: &[SchemeDocument],
            embeddings: &[Vec<f32>],
            _embedding_model: &str,
            replace: bool,
        ) -> Result<usize> {
            assert_eq!(documents.len(), embeddings.len());
            self.writes.lock().unwrap().push(replace);

            let mut ids = self.ids.lock().unwrap();
            if replace {
                ids.clear();
            }
            ids.extend(documents.iter().map(|d| d.id.clone()));
            Ok(documents.len())
        }
    }

    /// Embedder that records batch sizes and can be told to fail
    struct BatchEmbedder {
        inner: MockEmbedder,
        batches: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl BatchEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                inner: MockEmbedder::new(4),
                batches: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Embedder for BatchEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            if self.fail {
                return Err(AppError::EmbeddingError { message: "connection refused".into() });
            }
            self.inner.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "batch-test"
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    fn corpus_file(count: usize) -> tempfile::NamedTempFile {
        let records: Vec<serde_json::Value> = (0..count)
            .map(|i| serde_json::json!({"Scheme Name": format!("Scheme {}", i)}))
            .collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::Value::Array(records)).unwrap();
        file
    }

    fn indexer(
        store: Arc<MemoryStore>,
        embedder: Arc<BatchEmbedder>,
        schemes_path: &str,
    ) -> SchemeIndexer {
        let config = IndexerConfig {
            schemes_path: schemes_path.to_string(),
            batch_size: 2,
            index_on_startup: true,
        };
        SchemeIndexer::new(store, embedder, config)
    }

    #[test]
    fn test_report_serialization() {
        let report = IndexReport::Indexed { indexed: 816 };
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["status"], "indexed");
        assert_eq!(json["indexed"], 816);

        let json = serde_json::to_value(IndexReport::AlreadyIndexed { existing: 3 }).unwrap();
        assert_eq!(json["status"], "already_indexed");
    }

    #[tokio::test]
    async fn test_existing_index_is_kept() {
        let store = Arc::new(MemoryStore::with(&["scheme_0"]));
        let embedder = Arc::new(BatchEmbedder::new(false));

        let report = indexer(store.clone(), embedder.clone(), "/nonexistent.json")
            .ensure_indexed(false)
            .await
            .unwrap();

        assert_eq!(report, IndexReport::AlreadyIndexed { existing: 1 });
        assert!(embedder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_is_filled_in_batches() {
        let file = corpus_file(3);
        let store = Arc::new(MemoryStore::with(&[]));
        let embedder = Arc::new(BatchEmbedder::new(false));

        let report = indexer(store.clone(), embedder.clone(), file.path().to_str().unwrap())
            .ensure_indexed(false)
            .await
            .unwrap();

        assert_eq!(report, IndexReport::Indexed { indexed: 3 });
        assert_eq!(*embedder.batches.lock().unwrap(), vec![2, 1]);
        assert_eq!(store.ids(), vec!["scheme_0", "scheme_1", "scheme_2"]);
        assert_eq!(*store.writes.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_force_replaces_index_in_one_write() {
        let file = corpus_file(2);
        let store = Arc::new(MemoryStore::with(&["scheme_0", "scheme_1", "scheme_9"]));
        let embedder = Arc::new(BatchEmbedder::new(false));

        let report = indexer(store.clone(), embedder, file.path().to_str().unwrap())
            .ensure_indexed(true)
            .await
            .unwrap();

        assert_eq!(report, IndexReport::Indexed { indexed: 2 });
        assert_eq!(store.ids(), vec!["scheme_0", "scheme_1"]);
        assert_eq!(*store.writes.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_force_with_missing_file_keeps_index() {
        let store = Arc::new(MemoryStore::with(&["scheme_0", "scheme_1"]));
        let embedder = Arc::new(BatchEmbedder::new(false));

        let result = indexer(store.clone(), embedder, "/nonexistent/schemes.json")
            .ensure_indexed(true)
            .await;

        assert!(matches!(result, Err(AppError::Configuration { .. })));
        assert_eq!(store.ids(), vec!["scheme_0", "scheme_1"]);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_force_with_failing_embedder_keeps_index() {
        let file = corpus_file(3);
        let store = Arc::new(MemoryStore::with(&["scheme_0"]));
        let embedder = Arc::new(BatchEmbedder::new(true));

        let result = indexer(store.clone(), embedder, file.path().to_str().unwrap())
            .ensure_indexed(true)
            .await;

        assert!(matches!(result, Err(AppError::EmbeddingError { .. })));
        assert_eq!(store.ids(), vec!["scheme_0"]);
        assert!(store.writes.lock().unwrap().is_empty());
    }
}
