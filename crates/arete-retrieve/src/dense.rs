//! Dense retriever (C5): preprocesses the query, invokes a
//! [`crate::vector_store::VectorStore`], enhances scores, and returns a
//! ranked list of [`SearchResult`].
//!
//! Grounded on the teacher's brute-force `DenseRetriever` (preprocessing +
//! ranking loop shape) and `dense_retrieval_service.py` (the exact
//! preprocessing/score-enhancement/batch/metrics behavior). The teacher's
//! ANN zoo (HNSW, NSW, ScaNN, IVF-PQ, DiskANN, …) has no counterpart in
//! §4.4/§4.5, which frame the vector store as a narrow external interface —
//! see DESIGN.md for the removal note.

use crate::error::QueryProcessingError;
use crate::model::{Passage, RetrievalMethod, SearchResult};
use crate::tokenize::contains_greek;
use crate::vector_store::{VectorFilter, VectorStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Curated philosophical glossary used by the score-enhancement multiplier
/// (§4.5). Kept distinct from C3/C7's lists per-component, per SPEC_FULL.md.
const GLOSSARY: &[&str] = &[
    "virtue",
    "ethics",
    "justice",
    "wisdom",
    "knowledge",
    "truth",
    "eudaimonia",
    "arete",
    "phronesis",
];

/// A caller-supplied scorer composed after built-in enhancement (§4.5).
pub type CustomScorer = dyn Fn(&Passage, f32, &str) -> f32 + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DenseSearchOptions {
    pub limit: usize,
    pub min_relevance: f32,
    pub enhance_scores: bool,
    pub expand_context: bool,
    pub context_window_size: u32,
}

impl Default for DenseSearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_relevance: 0.0,
            enhance_scores: true,
            expand_context: false,
            context_window_size: 1,
        }
    }
}

/// Running metrics rolled up by the orchestrator (§4.5/§1.1).
#[derive(Debug, Default)]
pub struct DenseMetrics {
    queries_processed: AtomicU64,
    total_results_returned: AtomicU64,
    relevance_sum_millis: AtomicU64,
    latency_sum_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseMetricsSummary {
    pub queries_processed: u64,
    pub total_results_returned: u64,
    pub average_relevance_score: f32,
    pub average_response_time_micros: f32,
}

impl DenseMetrics {
    fn record(&self, result_count: usize, relevance_sum: f32, elapsed_micros: u64) {
        self.queries_processed.fetch_add(1, Ordering::Relaxed);
        self.total_results_returned
            .fetch_add(result_count as u64, Ordering::Relaxed);
        self.relevance_sum_millis
            .fetch_add((relevance_sum * 1000.0) as u64, Ordering::Relaxed);
        self.latency_sum_micros
            .fetch_add(elapsed_micros, Ordering::Relaxed);
    }

    pub fn summary(&self) -> DenseMetricsSummary {
        let queries = self.queries_processed.load(Ordering::Relaxed);
        let results = self.total_results_returned.load(Ordering::Relaxed);
        let relevance_sum = self.relevance_sum_millis.load(Ordering::Relaxed) as f32 / 1000.0;
        let latency_sum = self.latency_sum_micros.load(Ordering::Relaxed);
        DenseMetricsSummary {
            queries_processed: queries,
            total_results_returned: results,
            average_relevance_score: if results > 0 {
                relevance_sum / results as f32
            } else {
                0.0
            },
            average_response_time_micros: if queries > 0 {
                latency_sum as f32 / queries as f32
            } else {
                0.0
            },
        }
    }

    pub fn reset(&self) {
        self.queries_processed.store(0, Ordering::Relaxed);
        self.total_results_returned.store(0, Ordering::Relaxed);
        self.relevance_sum_millis.store(0, Ordering::Relaxed);
        self.latency_sum_micros.store(0, Ordering::Relaxed);
    }
}

/// Preprocess a query: trim, NFKC-normalize, collapse whitespace. Greek,
/// Devanagari, Hebrew, and Arabic code ranges pass through unchanged since
/// they are not stripped by this transform. No stop-word removal.
fn preprocess_query(text: &str) -> Result<String, QueryProcessingError> {
    use unicode_normalization::UnicodeNormalization;
    let normalized: String = text.trim().nfkc().collect();
    let collapsed: String = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(QueryProcessingError::EmptyQuery);
    }
    Ok(collapsed)
}

/// Multiplicative score enhancement (§4.5), clamped to `[0, 1]`.
fn enhance_relevance_score(passage: &Passage, base_score: f32, query: &str) -> f32 {
    let mut score = base_score;
    let query_lower = query.to_lowercase();
    let text_lower = passage.text.to_lowercase();

    if GLOSSARY
        .iter()
        .any(|term| query_lower.contains(term) && text_lower.contains(term))
    {
        score *= 1.10;
    }

    if contains_greek(query) && contains_greek(&passage.text) {
        score *= 1.15;
    }

    if passage.word_count > 100 {
        score *= 1.05;
    }

    score.clamp(0.0, 1.0)
}

/// Dense retriever (C5): query preprocessing, vector search, score
/// enhancement, context expansion tagging, batch search, and metrics.
pub struct DenseRetriever {
    store: std::sync::Arc<dyn VectorStore>,
    custom_scorer: Option<Box<CustomScorer>>,
    metrics: DenseMetrics,
}

impl DenseRetriever {
    pub fn new(store: std::sync::Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            custom_scorer: None,
            metrics: DenseMetrics::default(),
        }
    }

    pub fn with_custom_scorer(mut self, scorer: Box<CustomScorer>) -> Self {
        self.custom_scorer = Some(scorer);
        self
    }

    pub fn metrics(&self) -> DenseMetricsSummary {
        self.metrics.summary()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Search by a precomputed query embedding.
    pub fn search_by_vector(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        options: DenseSearchOptions,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<SearchResult>, QueryProcessingError> {
        let started = std::time::Instant::now();
        let preprocessed = preprocess_query(query_text)?;

        // Request a wider pool than `limit` so score enhancement/filtering
        // doesn't starve the final ranked list.
        let pool_size = (options.limit * 2).max(options.limit).max(1);
        let hits = self
            .store
            .search_near_vector(query_embedding, pool_size, 0.0, filter)?;

        let mut results: Vec<SearchResult> = Vec::with_capacity(hits.len());
        for (passage_id, certainty) in hits {
            let Some(passage) = self.store.fetch(passage_id) else {
                continue;
            };
            let mut score = certainty.clamp(0.0, 1.0);
            if options.enhance_scores {
                score = enhance_relevance_score(&passage, score, &preprocessed);
            }
            if let Some(scorer) = &self.custom_scorer {
                score = scorer(&passage, score, &preprocessed).clamp(0.0, 1.0);
            }
            if score < options.min_relevance {
                continue;
            }
            let mut result = SearchResult::new(passage, score, &preprocessed);
            result.tag("retrieval_method", RetrievalMethod::Dense.as_str());
            results.push(result);
        }

        results.sort_by(|a, b| {
            b.final_score()
                .partial_cmp(&a.final_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.passage.id.cmp(&b.passage.id))
        });
        results.truncate(options.limit);
        for (i, r) in results.iter_mut().enumerate() {
            r.ranking_position = (i + 1) as u32;
        }

        if options.expand_context {
            for r in &mut results {
                r.tag("context_expanded", true);
                r.tag("context_window_size", options.context_window_size);
            }
        }

        let relevance_sum: f32 = results.iter().map(|r| r.final_score()).sum();
        self.metrics
            .record(results.len(), relevance_sum, started.elapsed().as_micros() as u64);

        Ok(results)
    }

    /// `batch_search`: a failure on one query yields an empty result list for
    /// that query and does not abort the rest (§4.5).
    pub fn batch_search(
        &self,
        queries: &[(String, Vec<f32>)],
        options: DenseSearchOptions,
        filter: Option<&VectorFilter>,
    ) -> HashMap<String, Vec<SearchResult>> {
        let mut out = HashMap::with_capacity(queries.len());
        for (query_text, embedding) in queries {
            let results = self
                .search_by_vector(embedding, query_text, options, filter)
                .unwrap_or_default();
            out.insert(query_text.clone(), results);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::InMemoryVectorStore;
    use std::sync::Arc;

    fn make_store() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .insert(&Passage::new(1, 0, "virtue is the mean between extremes").with_embedding(vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        store
            .insert(&Passage::new(2, 0, "the weather today is mild").with_embedding(vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();
        store
    }

    #[test]
    fn empty_query_is_rejected() {
        let store = make_store();
        let retriever = DenseRetriever::new(store);
        let err = retriever.search_by_vector(&[1.0, 0.0, 0.0, 0.0], "   ", DenseSearchOptions::default(), None);
        assert!(matches!(err, Err(QueryProcessingError::EmptyQuery)));
    }

    #[test]
    fn glossary_match_boosts_score() {
        let store = make_store();
        let retriever = DenseRetriever::new(store);
        let results = retriever
            .search_by_vector(&[1.0, 0.0, 0.0, 0.0], "virtue", DenseSearchOptions::default(), None)
            .unwrap();
        assert_eq!(results[0].passage.id, 1);
        assert!(results[0].final_score() >= results[0].relevance_score);
    }

    #[test]
    fn ranking_positions_start_at_one() {
        let store = make_store();
        let retriever = DenseRetriever::new(store);
        let results = retriever
            .search_by_vector(&[1.0, 0.0, 0.0, 0.0], "virtue", DenseSearchOptions::default(), None)
            .unwrap();
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.ranking_position, (i + 1) as u32);
        }
    }

    #[test]
    fn batch_search_isolates_failures() {
        let store = make_store();
        let retriever = DenseRetriever::new(store);
        let queries = vec![
            ("virtue".to_string(), vec![1.0, 0.0, 0.0, 0.0]),
            ("   ".to_string(), vec![0.0, 1.0, 0.0, 0.0]),
        ];
        let results = retriever.batch_search(&queries, DenseSearchOptions::default(), None);
        assert!(!results["virtue"].is_empty());
        assert!(results["   "].is_empty());
    }

    #[test]
    fn metrics_track_queries_and_results() {
        let store = make_store();
        let retriever = DenseRetriever::new(store);
        retriever
            .search_by_vector(&[1.0, 0.0, 0.0, 0.0], "virtue", DenseSearchOptions::default(), None)
            .unwrap();
        let summary = retriever.metrics();
        assert_eq!(summary.queries_processed, 1);
    }
}
