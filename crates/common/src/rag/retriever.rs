//! Similarity search over the scheme index and relevance filtering

use super::types::RetrievedMatch;
use crate::config::RagConfig;
use crate::db::Repository;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Raw answer of a vector search: parallel arrays, nearest first.
///
/// Either array may be missing when a backend answers with a partial payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub documents: Option<Vec<String>>,
    pub distances: Option<Vec<f64>>,
}

impl SearchResults {
    pub fn new(documents: Vec<String>, distances: Vec<f64>) -> Self {
        Self {
            documents: Some(documents),
            distances: Some(distances),
        }
    }

    /// Zip the arrays, rejecting missing or mismatched ones
    pub fn into_pairs(self) -> Result<Vec<(String, f64)>> {
        let (Some(documents), Some(distances)) = (self.documents, self.distances) else {
            return Err(AppError::IndexError {
                message: "search result is missing documents or distances".to_string(),
            });
        };

        if documents.len() != distances.len() {
            return Err(AppError::IndexError {
                message: format!(
                    "search result has {} documents but {} distances",
                    documents.len(),
                    distances.len()
                ),
            });
        }

        Ok(documents.into_iter().zip(distances).collect())
    }
}

/// Embedding + vector index service
#[async_trait]
pub trait SchemeIndex: Send + Sync {
    /// Up to `k` nearest scheme documents for `query`
    async fn search(&self, query: &str, k: usize) -> Result<SearchResults>;
}

/// Cosine-distance search over the `schemes` table
pub struct PgVectorIndex {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorIndex {
    pub fn new(repository: Repository, embedder: Arc<dyn Embedder>) -> Self {
        Self { repository, embedder }
    }
}

#[async_trait]
impl SchemeIndex for PgVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<SearchResults> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self.repository.nearest_schemes(&embedding, k).await?;

        let (documents, distances): (Vec<String>, Vec<f64>) = hits
            .into_iter()
            .map(|hit| (hit.content, hit.distance))
            .unzip();

        Ok(SearchResults::new(documents, distances))
    }
}

/// Keep matches strictly below `cutoff`, preserving order and original rank
pub fn filter_matches<I>(pairs: I, cutoff: f64) -> Vec<RetrievedMatch>
where
    I: IntoIterator<Item = (String, f64)>,
{
    pairs
        .into_iter()
        .enumerate()
        .filter(|(_, (_, distance))| *distance < cutoff)
        .map(|(i, (document, distance))| RetrievedMatch {
            rank: i + 1,
            document,
            distance,
        })
        .collect()
}

/// Searches the index and applies the fixed relevance cutoff.
///
/// Never fails: an unreachable index or a malformed answer yields no matches.
pub struct Retriever {
    index: Arc<dyn SchemeIndex>,
    top_k: usize,
    cutoff: f64,
}

impl Retriever {
    pub fn new(index: Arc<dyn SchemeIndex>, config: &RagConfig) -> Self {
        Self {
            index,
            top_k: config.top_k,
            cutoff: config.distance_cutoff,
        }
    }

    /// Retrieve with the configured `k`
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedMatch> {
        self.retrieve_k(query, self.top_k).await
    }

    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Vec<RetrievedMatch> {
        let start = Instant::now();

        let pairs = match self.index.search(query, k).await.and_then(SearchResults::into_pairs) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "Scheme search failed, continuing without context");
                metrics::record_retrieval(start.elapsed().as_secs_f64(), 0, false);
                return Vec::new();
            }
        };

        let returned = pairs.len();
        let matches = filter_matches(pairs, self.cutoff);

        for m in &matches {
            debug!(rank = m.rank, distance = m.distance, relevance = m.relevance(), "Match kept");
        }
        debug!(returned, kept = matches.len(), cutoff = self.cutoff, "Filtered search results");

        metrics::record_retrieval(start.elapsed().as_secs_f64(), matches.len(), true);
        matches
    }
}
