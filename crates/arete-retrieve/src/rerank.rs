//! Re-ranker (C7): second-pass scoring over a candidate list, with domain
//! boosts, result caching, and usage metrics.
//!
//! Grounded on `reranking_service.py` — method set, default configuration
//! values, boost-then-filter-then-sort-then-truncate-then-renumber ordering,
//! and the `RerankingMetrics` shape.

use crate::error::RerankingError;
use crate::model::{RerankedResult, SearchResult};
use crate::simd::cosine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

const PHILOSOPHICAL_TERMS: &[&str] = &[
    "virtue",
    "ethics",
    "morality",
    "justice",
    "wisdom",
    "knowledge",
    "truth",
    "beauty",
    "good",
    "evil",
    "soul",
    "mind",
    "reason",
    "logic",
    "metaphysics",
    "epistemology",
    "ontology",
];

const CLASSICAL_AUTHORS: &[&str] = &[
    "plato",
    "aristotle",
    "socrates",
    "epicurus",
    "stoic",
    "kant",
    "nietzsche",
    "hume",
    "descartes",
    "aquinas",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RerankingMethod {
    CrossEncoder,
    SemanticSimilarity,
    Hybrid,
    /// Reserved; falls back to `CrossEncoder` with a logged notice (§4.7).
    Listwise,
}

impl RerankingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankingMethod::CrossEncoder => "cross_encoder",
            RerankingMethod::SemanticSimilarity => "semantic_similarity",
            RerankingMethod::Hybrid => "hybrid",
            RerankingMethod::Listwise => "listwise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompositionRule {
    RelevanceOnly,
    RerankOnly,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RerankingConfig {
    pub method: RerankingMethod,
    pub max_candidates: usize,
    pub top_k: usize,
    pub batch_size: usize,
    pub original_weight: f32,
    pub rerank_weight: f32,
    pub composition: CompositionRule,
    pub score_threshold: f32,
    pub cache_ttl: Duration,
    pub philosophical_boost: f32,
    pub classical_author_boost: f32,
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            method: RerankingMethod::CrossEncoder,
            max_candidates: 50,
            top_k: 20,
            batch_size: 8,
            original_weight: 0.3,
            rerank_weight: 0.7,
            composition: CompositionRule::Weighted,
            score_threshold: 0.0,
            cache_ttl: Duration::from_secs(300),
            philosophical_boost: 0.10,
            classical_author_boost: 0.05,
        }
    }
}

impl RerankingConfig {
    pub fn validate(&self) -> Result<(), RerankingError> {
        if (self.original_weight + self.rerank_weight - 1.0).abs() > 1e-3 {
            return Err(RerankingError::InvalidWeights(self.original_weight, self.rerank_weight));
        }
        Ok(())
    }
}

/// A pairwise `(query, passage text) -> score in [0,1]` scorer, batched in
/// groups of `batch_size` (§4.7 CrossEncoder).
pub trait CrossEncoderScorer: Send + Sync {
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RerankingError>;
}

/// An embedding provider used by `SemanticSimilarity`/`Hybrid` when a
/// passage or the query has no precomputed embedding.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RerankingError>;
}

#[derive(Debug, Default)]
pub struct RerankingMetrics {
    total_queries: AtomicU64,
    total_results_processed: AtomicU64,
    processing_time_micros_sum: AtomicU64,
    error_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    method_usage: RwLock<HashMap<&'static str, u64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankingMetricsSummary {
    pub total_queries: u64,
    pub total_results_processed: u64,
    pub average_processing_time_micros: f32,
    pub error_count: u64,
    pub cache_hit_rate: f32,
    pub method_usage: HashMap<&'static str, u64>,
}

impl RerankingMetrics {
    fn record(&self, method: RerankingMethod, result_count: usize, elapsed: Duration) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_results_processed
            .fetch_add(result_count as u64, Ordering::Relaxed);
        self.processing_time_micros_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        *self
            .method_usage
            .write()
            .expect("rerank metrics lock poisoned")
            .entry(method.as_str())
            .or_insert(0) += 1;
    }

    fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RerankingMetricsSummary {
        let queries = self.total_queries.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total_lookups = hits + misses;
        RerankingMetricsSummary {
            total_queries: queries,
            total_results_processed: self.total_results_processed.load(Ordering::Relaxed),
            average_processing_time_micros: if queries > 0 {
                self.processing_time_micros_sum.load(Ordering::Relaxed) as f32 / queries as f32
            } else {
                0.0
            },
            error_count: self.error_count.load(Ordering::Relaxed),
            cache_hit_rate: if total_lookups > 0 {
                hits as f32 / total_lookups as f32
            } else {
                0.0
            },
            method_usage: self
                .method_usage
                .read()
                .expect("rerank metrics lock poisoned")
                .clone(),
        }
    }
}

fn apply_domain_boosts(text_lower: &str, config: &RerankingConfig, mut score: f32) -> f32 {
    if PHILOSOPHICAL_TERMS.iter().any(|t| text_lower.contains(t)) {
        score += config.philosophical_boost;
    }
    if CLASSICAL_AUTHORS.iter().any(|a| text_lower.contains(a)) {
        score += config.classical_author_boost;
    }
    score.min(1.0)
}

fn cache_key(query: &str, method: RerankingMethod, candidates: &[SearchResult]) -> String {
    let ids: Vec<String> = candidates.iter().take(10).map(|r| r.passage.id.to_string()).collect();
    format!("{query}|{}|{}", method.as_str(), ids.join(","))
}

struct CacheEntry {
    results: Vec<RerankedResult>,
    inserted_at: Instant,
}

/// Re-ranker (C7).
pub struct Reranker {
    cross_encoder: Option<Box<dyn CrossEncoderScorer>>,
    embedder: Option<Box<dyn EmbeddingProvider>>,
    metrics: RerankingMetrics,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl Reranker {
    pub fn new() -> Self {
        Self {
            cross_encoder: None,
            embedder: None,
            metrics: RerankingMetrics::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_cross_encoder(mut self, scorer: Box<dyn CrossEncoderScorer>) -> Self {
        self.cross_encoder = Some(scorer);
        self
    }

    pub fn with_embedder(mut self, embedder: Box<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn metrics(&self) -> RerankingMetricsSummary {
        self.metrics.summary()
    }

    fn embedding_for(&self, result: &SearchResult) -> Result<Vec<f32>, RerankingError> {
        if let Some(e) = &result.passage.embedding {
            return Ok(e.clone());
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| RerankingError::EmbeddingUnavailable("no embedding provider configured".to_string()))?;
        embedder.embed(&result.passage.text)
    }

    fn cross_encoder_scores(&self, query: &str, candidates: &[SearchResult], batch_size: usize) -> Result<Vec<f32>, RerankingError> {
        let scorer = self
            .cross_encoder
            .as_ref()
            .ok_or_else(|| RerankingError::ScorerFailed("no cross-encoder scorer configured".to_string()))?;
        let mut scores = Vec::with_capacity(candidates.len());
        for chunk in candidates.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = chunk.iter().map(|r| r.passage.text.as_str()).collect();
            let batch_scores = scorer.score_batch(query, &texts)?;
            scores.extend(batch_scores);
        }
        Ok(scores)
    }

    fn semantic_scores(&self, query_embedding: &[f32], candidates: &[SearchResult]) -> Result<Vec<f32>, RerankingError> {
        candidates
            .iter()
            .map(|r| self.embedding_for(r).map(|emb| cosine(query_embedding, &emb)))
            .collect()
    }

    /// Re-rank `candidates` (truncated to `max_candidates`) against `query`.
    pub fn rerank(
        &self,
        query: &str,
        candidates: &[SearchResult],
        query_embedding: Option<&[f32]>,
        config: &RerankingConfig,
    ) -> Result<Vec<RerankedResult>, RerankingError> {
        if query.trim().is_empty() {
            return Err(RerankingError::EmptyQuery);
        }
        config.validate()?;

        let started = Instant::now();
        let candidates: Vec<SearchResult> = candidates.iter().take(config.max_candidates).cloned().collect();

        let key = cache_key(query, config.method, &candidates);
        if let Some(entry) = self.cache.read().expect("rerank cache lock poisoned").get(&key) {
            if entry.inserted_at.elapsed() < config.cache_ttl {
                self.metrics.record_cache_hit();
                let mut results = entry.results.clone();
                results.truncate(config.top_k);
                return Ok(results);
            }
        }
        self.metrics.record_cache_miss();

        let result = self.rerank_uncached(query, &candidates, query_embedding, config);
        match &result {
            Ok(results) => {
                self.cache.write().expect("rerank cache lock poisoned").insert(
                    key,
                    CacheEntry {
                        results: results.clone(),
                        inserted_at: Instant::now(),
                    },
                );
                self.metrics.record(config.method, results.len(), started.elapsed());
            }
            Err(_) => self.metrics.record_error(),
        }
        result
    }

    fn rerank_uncached(
        &self,
        query: &str,
        candidates: &[SearchResult],
        query_embedding: Option<&[f32]>,
        config: &RerankingConfig,
    ) -> Result<Vec<RerankedResult>, RerankingError> {
        let effective_method = match config.method {
            RerankingMethod::Listwise => {
                tracing::warn!("listwise reranking is reserved; falling back to cross_encoder");
                RerankingMethod::CrossEncoder
            }
            other => other,
        };

        let rerank_scores: Vec<f32> = match effective_method {
            RerankingMethod::CrossEncoder => self.cross_encoder_scores(query, candidates, config.batch_size)?,
            RerankingMethod::SemanticSimilarity => {
                let query_embedding = query_embedding
                    .ok_or_else(|| RerankingError::EmbeddingUnavailable("query embedding required".to_string()))?;
                self.semantic_scores(query_embedding, candidates)?
            }
            RerankingMethod::Hybrid => {
                let cross = self.cross_encoder_scores(query, candidates, config.batch_size)?;
                let query_embedding = query_embedding
                    .ok_or_else(|| RerankingError::EmbeddingUnavailable("query embedding required".to_string()))?;
                let semantic = self.semantic_scores(query_embedding, candidates)?;
                cross.into_iter().zip(semantic).map(|(c, s)| 0.7 * c + 0.3 * s).collect()
            }
            RerankingMethod::Listwise => unreachable!("resolved to CrossEncoder above"),
        };

        let mut reranked: Vec<RerankedResult> = candidates
            .iter()
            .zip(rerank_scores)
            .enumerate()
            .map(|(i, (original, raw_rerank_score))| {
                let text_lower = original.passage.text.to_lowercase();
                let boosted = apply_domain_boosts(&text_lower, config, raw_rerank_score.clamp(0.0, 1.0));
                let final_score = match config.composition {
                    CompositionRule::RelevanceOnly => original.final_score(),
                    CompositionRule::RerankOnly => boosted,
                    CompositionRule::Weighted => {
                        original.relevance_score * config.original_weight + boosted * config.rerank_weight
                    }
                };
                RerankedResult {
                    original_result: original.clone(),
                    rerank_score: final_score,
                    original_rank: (i + 1) as u32,
                    new_rank: 0,
                    score_improvement: final_score - original.final_score(),
                    reranking_method: effective_method.as_str().to_string(),
                    metadata: Default::default(),
                }
            })
            .collect();

        reranked.retain(|r| r.rerank_score >= config.score_threshold);
        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.original_result.passage.id.cmp(&b.original_result.passage.id))
        });
        reranked.truncate(config.top_k);
        for (i, r) in reranked.iter_mut().enumerate() {
            r.new_rank = (i + 1) as u32;
        }

        Ok(reranked)
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Passage;

    struct ConstantScorer(f32);
    impl CrossEncoderScorer for ConstantScorer {
        fn score_batch(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>, RerankingError> {
            Ok(vec![self.0; passages.len()])
        }
    }

    fn candidate(id: u32, text: &str, score: f32) -> SearchResult {
        SearchResult::new(Passage::new(id, 0, text), score, "query")
    }

    #[test]
    fn empty_query_is_rejected() {
        let reranker = Reranker::new().with_cross_encoder(Box::new(ConstantScorer(0.5)));
        let candidates = vec![candidate(1, "virtue and justice", 0.5)];
        let err = reranker.rerank("   ", &candidates, None, &RerankingConfig::default());
        assert!(matches!(err, Err(RerankingError::EmptyQuery)));
    }

    #[test]
    fn philosophical_boost_raises_score() {
        let reranker = Reranker::new().with_cross_encoder(Box::new(ConstantScorer(0.5)));
        let candidates = vec![
            candidate(1, "virtue and justice in the polis", 0.5),
            candidate(2, "the price of bread rose today", 0.5),
        ];
        let config = RerankingConfig {
            composition: CompositionRule::RerankOnly,
            ..RerankingConfig::default()
        };
        let results = reranker.rerank("query", &candidates, None, &config).unwrap();
        let boosted = results.iter().find(|r| r.original_result.passage.id == 1).unwrap();
        let unboosted = results.iter().find(|r| r.original_result.passage.id == 2).unwrap();
        assert!(boosted.rerank_score > unboosted.rerank_score);
    }

    #[test]
    fn identical_calls_within_ttl_are_cached() {
        let reranker = Reranker::new().with_cross_encoder(Box::new(ConstantScorer(0.5)));
        let candidates = vec![candidate(1, "virtue", 0.5)];
        let config = RerankingConfig::default();
        let first = reranker.rerank("query", &candidates, None, &config).unwrap();
        let second = reranker.rerank("query", &candidates, None, &config).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].rerank_score, second[0].rerank_score);
        assert!(reranker.metrics().cache_hit_rate > 0.0);
    }

    #[test]
    fn new_rank_is_contiguous_from_one() {
        let reranker = Reranker::new().with_cross_encoder(Box::new(ConstantScorer(0.9)));
        let candidates = vec![candidate(1, "a", 0.1), candidate(2, "b", 0.2), candidate(3, "c", 0.3)];
        let results = reranker.rerank("query", &candidates, None, &RerankingConfig::default()).unwrap();
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.new_rank, (i + 1) as u32);
        }
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let reranker = Reranker::new().with_cross_encoder(Box::new(ConstantScorer(0.5)));
        let candidates = vec![candidate(1, "a", 0.1)];
        let config = RerankingConfig {
            original_weight: 0.5,
            rerank_weight: 0.2,
            ..RerankingConfig::default()
        };
        let err = reranker.rerank("query", &candidates, None, &config);
        assert!(matches!(err, Err(RerankingError::InvalidWeights(_, _))));
    }
}
