//! Retrieval orchestrator (C10): wires the inverted index, vector store,
//! BM25/sparse-expansion/dense retrievers, fusion, re-ranking, diversity, and
//! graph traversal behind one `search` surface.
//!
//! Grounded on `retrieval.py::RetrievalRepository` — the `search()` dispatch
//! over retrieval methods, `HybridRetrievalConfig`, and the degraded-mode
//! policy where a sub-retriever failure does not abort a hybrid search as
//! long as the other side produced results.

use crate::bm25::{Bm25Scorer, ScoreFilter};
use crate::dense::{DenseRetriever, DenseSearchOptions};
use crate::error::{RepositoryError, RetrievalError};
use crate::fusion::{self, FusionConfig};
use crate::graph::GraphTraversalService;
use crate::index::InvertedIndex;
use crate::model::{Passage, PassageId, RetrievalMethod, SearchResult};
use crate::sparse_expansion::SparseExpansionScorer;
use crate::vector_store::{VectorFilter, VectorStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Top-level knobs for a hybrid search call, separate from the per-component
/// configs each sub-retriever owns (§4.10/§6).
///
/// `dense_pool_size`/`sparse_pool_size` default to `None`, meaning "derive
/// from `limit`": §4.10 specifies that hybrid methods request `2·limit` from
/// each sub-retriever before fusion. An explicit `Some(n)` overrides that
/// derivation for callers who want a wider or narrower pre-fusion pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridRetrievalConfig {
    pub fusion: FusionConfig,
    pub dense_pool_size: Option<usize>,
    pub sparse_pool_size: Option<usize>,
    pub limit: usize,
    pub min_relevance: f32,
}

impl HybridRetrievalConfig {
    fn dense_pool_size(&self) -> usize {
        self.dense_pool_size.unwrap_or(2 * self.limit)
    }

    fn sparse_pool_size(&self) -> usize {
        self.sparse_pool_size.unwrap_or(2 * self.limit)
    }
}

impl Default for HybridRetrievalConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            dense_pool_size: None,
            sparse_pool_size: None,
            limit: 10,
            min_relevance: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct OrchestratorMetrics {
    searches: AtomicU64,
    dense_failures: AtomicU64,
    sparse_failures: AtomicU64,
    degraded_searches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorMetricsSummary {
    pub searches: u64,
    pub dense_failures: u64,
    pub sparse_failures: u64,
    pub degraded_searches: u64,
}

impl OrchestratorMetrics {
    fn summary(&self) -> OrchestratorMetricsSummary {
        OrchestratorMetricsSummary {
            searches: self.searches.load(Ordering::Relaxed),
            dense_failures: self.dense_failures.load(Ordering::Relaxed),
            sparse_failures: self.sparse_failures.load(Ordering::Relaxed),
            degraded_searches: self.degraded_searches.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.searches.store(0, Ordering::Relaxed);
        self.dense_failures.store(0, Ordering::Relaxed);
        self.sparse_failures.store(0, Ordering::Relaxed);
        self.degraded_searches.store(0, Ordering::Relaxed);
    }
}

/// Retrieval orchestrator (C10).
pub struct RetrievalOrchestrator {
    index: RwLock<InvertedIndex>,
    passages: RwLock<HashMap<PassageId, Passage>>,
    vector_store: Arc<dyn VectorStore>,
    bm25: Bm25Scorer,
    sparse: SparseExpansionScorer,
    dense: DenseRetriever,
    graph: Option<Arc<GraphTraversalService>>,
    hybrid_config: RwLock<HybridRetrievalConfig>,
    metrics: OrchestratorMetrics,
}

impl RetrievalOrchestrator {
    pub fn new(vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            index: RwLock::new(InvertedIndex::new()),
            passages: RwLock::new(HashMap::new()),
            dense: DenseRetriever::new(Arc::clone(&vector_store)),
            vector_store,
            bm25: Bm25Scorer::new(crate::bm25::Bm25Params::default()),
            sparse: SparseExpansionScorer::new(crate::sparse_expansion::SparseExpansionParams::default()),
            graph: None,
            hybrid_config: RwLock::new(HybridRetrievalConfig::default()),
            metrics: OrchestratorMetrics::default(),
        }
    }

    pub fn with_graph_service(mut self, service: Arc<GraphTraversalService>) -> Self {
        self.graph = Some(service);
        self
    }

    /// Index a passage for sparse/BM25 retrieval and, if it carries an
    /// embedding, for dense retrieval too.
    pub fn index_passage(&self, passage: &Passage) -> Result<(), RepositoryError> {
        self.index.write().expect("index lock poisoned").add(passage)?;
        self.passages
            .write()
            .expect("passages lock poisoned")
            .insert(passage.id, passage.clone());
        if passage.embedding.is_some() {
            self.vector_store
                .insert(passage)
                .map_err(RetrievalError::QueryProcessing)?;
        }
        Ok(())
    }

    pub fn set_hybrid_config(&self, config: HybridRetrievalConfig) {
        *self.hybrid_config.write().expect("hybrid config lock poisoned") = config;
    }

    pub fn hybrid_config(&self) -> HybridRetrievalConfig {
        *self.hybrid_config.read().expect("hybrid config lock poisoned")
    }

    pub fn metrics(&self) -> OrchestratorMetricsSummary {
        self.metrics.summary()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn search_sparse(&self, query: &str, limit: usize, min_relevance: f32, filter: Option<&ScoreFilter>) -> Vec<SearchResult> {
        let index = self.index.read().expect("index lock poisoned");
        let passages = self.passages.read().expect("passages lock poisoned");
        self.sparse.search(&index, &passages, query, limit, min_relevance, filter)
    }

    fn search_bm25(&self, query: &str, limit: usize, min_relevance: f32, filter: Option<&ScoreFilter>) -> Vec<SearchResult> {
        let index = self.index.read().expect("index lock poisoned");
        let passages = self.passages.read().expect("passages lock poisoned");
        self.bm25.search(&index, &passages, query, limit, min_relevance, filter)
    }

    /// Dispatch a search by [`RetrievalMethod`] (§4.10). Hybrid and
    /// graph-enhanced-hybrid degrade gracefully: if one side fails but the
    /// other returns results, the search still succeeds with a `tracing::warn!`
    /// and a bumped `degraded_searches` counter; it only errors when both
    /// sides fail.
    pub fn search(
        &self,
        method: RetrievalMethod,
        query: &str,
        query_embedding: Option<&[f32]>,
        vector_filter: Option<&VectorFilter>,
    ) -> Result<Vec<SearchResult>, RepositoryError> {
        self.metrics.searches.fetch_add(1, Ordering::Relaxed);
        let config = self.hybrid_config();

        match method {
            RetrievalMethod::Sparse => Ok(self.search_bm25(query, config.limit, config.min_relevance, None)),
            RetrievalMethod::Dense => {
                let embedding = query_embedding.ok_or_else(|| {
                    RepositoryError::Other {
                        subsystem: "orchestrator",
                        message: "dense search requires a query embedding".to_string(),
                    }
                })?;
                let options = DenseSearchOptions {
                    limit: config.limit,
                    min_relevance: config.min_relevance,
                    ..DenseSearchOptions::default()
                };
                Ok(self.dense.search_by_vector(embedding, query, options, vector_filter)?)
            }
            RetrievalMethod::Hybrid => self.search_hybrid(query, query_embedding, vector_filter, &config),
            RetrievalMethod::Graph => {
                let graph = self.graph.as_ref().ok_or_else(|| RepositoryError::Other {
                    subsystem: "orchestrator",
                    message: "no graph service configured".to_string(),
                })?;
                let base = self.search_bm25(query, config.limit, config.min_relevance, None);
                let traversal = graph.traverse(query)?;
                Ok(graph.enrich(&base, &traversal))
            }
            RetrievalMethod::GraphEnhancedHybrid => {
                let fused = self.search_hybrid(query, query_embedding, vector_filter, &config)?;
                match &self.graph {
                    Some(graph) => match graph.traverse(query) {
                        Ok(traversal) => Ok(graph.enrich(&fused, &traversal)),
                        Err(e) => {
                            tracing::warn!(error = %e, "graph traversal failed, returning ungraphed hybrid results");
                            Ok(fused)
                        }
                    },
                    None => Ok(fused),
                }
            }
        }
    }

    fn search_hybrid(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        vector_filter: Option<&VectorFilter>,
        config: &HybridRetrievalConfig,
    ) -> Result<Vec<SearchResult>, RepositoryError> {
        let sparse_results = self.search_sparse(query, config.sparse_pool_size(), 0.0, None);

        let dense_results = match query_embedding {
            Some(embedding) => {
                let options = DenseSearchOptions {
                    limit: config.dense_pool_size(),
                    min_relevance: 0.0,
                    ..DenseSearchOptions::default()
                };
                match self.dense.search_by_vector(embedding, query, options, vector_filter) {
                    Ok(results) => results,
                    Err(e) => {
                        self.metrics.dense_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "dense sub-retriever failed during hybrid search");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        if sparse_results.is_empty() && dense_results.is_empty() {
            return Err(RetrievalError::SubRetrieverFailed(
                "both dense and sparse sub-retrievers returned no results".to_string(),
            )
            .into());
        }
        if sparse_results.is_empty() || dense_results.is_empty() {
            self.metrics.degraded_searches.fetch_add(1, Ordering::Relaxed);
        }

        let fused = fusion::fuse(&dense_results, &sparse_results, &config.fusion, config.limit, config.min_relevance)?;
        Ok(fused.into_iter().map(|f| f.result).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::InMemoryVectorStore;

    fn orchestrator() -> RetrievalOrchestrator {
        let store = Arc::new(InMemoryVectorStore::new());
        let orchestrator = RetrievalOrchestrator::new(store);
        orchestrator
            .index_passage(&Passage::new(1, 0, "virtue is the mean between extremes").with_embedding(vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        orchestrator
            .index_passage(&Passage::new(2, 0, "justice concerns fairness in the city").with_embedding(vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();
        orchestrator
    }

    #[test]
    fn sparse_search_returns_matching_passage() {
        let orchestrator = orchestrator();
        let results = orchestrator.search(RetrievalMethod::Sparse, "virtue", None, None).unwrap();
        assert!(results.iter().any(|r| r.passage.id == 1));
    }

    #[test]
    fn dense_search_without_embedding_errors() {
        let orchestrator = orchestrator();
        let err = orchestrator.search(RetrievalMethod::Dense, "virtue", None, None);
        assert!(err.is_err());
    }

    #[test]
    fn hybrid_search_combines_both_sides() {
        let orchestrator = orchestrator();
        let embedding = vec![1.0, 0.0, 0.0, 0.0];
        let results = orchestrator
            .search(RetrievalMethod::Hybrid, "virtue", Some(&embedding), None)
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(orchestrator.metrics().searches, 1);
    }

    #[test]
    fn hybrid_search_degrades_when_dense_embedding_missing() {
        let orchestrator = orchestrator();
        let results = orchestrator.search(RetrievalMethod::Hybrid, "virtue", None, None).unwrap();
        assert!(!results.is_empty());
        assert_eq!(orchestrator.metrics().degraded_searches, 1);
    }

    #[test]
    fn hybrid_config_round_trips() {
        let orchestrator = orchestrator();
        let mut config = HybridRetrievalConfig::default();
        config.limit = 5;
        orchestrator.set_hybrid_config(config);
        assert_eq!(orchestrator.hybrid_config().limit, 5);
    }

    #[test]
    fn default_pool_sizes_derive_as_double_the_limit() {
        let config = HybridRetrievalConfig { limit: 7, ..HybridRetrievalConfig::default() };
        assert_eq!(config.dense_pool_size(), 14);
        assert_eq!(config.sparse_pool_size(), 14);
    }

    #[test]
    fn explicit_pool_size_overrides_the_derived_default() {
        let config = HybridRetrievalConfig {
            limit: 7,
            dense_pool_size: Some(100),
            ..HybridRetrievalConfig::default()
        };
        assert_eq!(config.dense_pool_size(), 100);
        assert_eq!(config.sparse_pool_size(), 14);
    }
}
