//! Hybrid fusion (C6): four strategies for combining a sparse ranked list
//! and a dense ranked list into one merged ranking.
//!
//! Grounded on `retrieval.py::RetrievalRepository`'s four `_*_fusion`
//! private methods; naming convention (`FusionConfig`, `FusionStrategy`)
//! taken from the teacher's `rank-rank` facade prelude, which names a fusion
//! strategy enum even though its own `rank-fusion` crate is not present in
//! the example pack.

use crate::error::FusionError;
use crate::model::{FusedResult, RetrievalMethod, SearchResult};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FusionStrategy {
    WeightedAverage,
    ReciprocalRankFusion,
    Interleaved,
    ScoreThreshold,
}

impl FusionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionStrategy::WeightedAverage => "weighted_average",
            FusionStrategy::ReciprocalRankFusion => "reciprocal_rank_fusion",
            FusionStrategy::Interleaved => "interleaved",
            FusionStrategy::ScoreThreshold => "score_threshold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FusionConfig {
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub strategy: FusionStrategy,
    pub min_dense_score: f32,
    pub min_sparse_score: f32,
    /// RRF constant `k` (default 60).
    pub fusion_k: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            dense_weight: 0.7,
            sparse_weight: 0.3,
            strategy: FusionStrategy::WeightedAverage,
            min_dense_score: 0.7,
            min_sparse_score: 0.1,
            fusion_k: 60,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), FusionError> {
        if (self.dense_weight + self.sparse_weight - 1.0).abs() > 1e-3 {
            return Err(FusionError::InvalidWeights {
                dense_weight: self.dense_weight,
                sparse_weight: self.sparse_weight,
            });
        }
        Ok(())
    }
}

fn ranks_by_id(results: &[SearchResult]) -> HashMap<u32, u32> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| (r.passage.id, (i + 1) as u32))
        .collect()
}

fn index_by_id(results: &[SearchResult]) -> HashMap<u32, &SearchResult> {
    results.iter().map(|r| (r.passage.id, r)).collect()
}

fn check_no_duplicates(results: &[SearchResult]) -> Result<(), FusionError> {
    let mut seen = std::collections::HashSet::with_capacity(results.len());
    for r in results {
        if !seen.insert(r.passage.id) {
            return Err(FusionError::DuplicateId(r.passage.id));
        }
    }
    Ok(())
}

/// Weighted-average fusion: when only one side holds a passage, that side's
/// score alone is scaled by its own weight (not renormalized) — §4.6.
fn weighted_average(
    dense: &[SearchResult],
    sparse: &[SearchResult],
    config: &FusionConfig,
) -> Vec<FusedResult> {
    let dense_by_id = index_by_id(dense);
    let sparse_by_id = index_by_id(sparse);
    let dense_ranks = ranks_by_id(dense);
    let sparse_ranks = ranks_by_id(sparse);

    let mut all_ids: Vec<u32> = dense_by_id.keys().chain(sparse_by_id.keys()).copied().collect();
    all_ids.sort_unstable();
    all_ids.dedup();

    all_ids
        .into_iter()
        .map(|id| {
            let d = dense_by_id.get(&id);
            let s = sparse_by_id.get(&id);
            let dense_score = d.map(|r| r.final_score()).unwrap_or(0.0);
            let sparse_score = s.map(|r| r.final_score()).unwrap_or(0.0);
            let fused_score = match (d, s) {
                (Some(_), Some(_)) => dense_score * config.dense_weight + sparse_score * config.sparse_weight,
                (Some(_), None) => dense_score * config.dense_weight,
                (None, Some(_)) => sparse_score * config.sparse_weight,
                (None, None) => unreachable!("id came from one of the two maps"),
            };
            let base = d.or(s).expect("id came from one of the two maps");
            let mut result = (*base).clone();
            result.tag("dense_score", dense_score);
            result.tag("sparse_score", sparse_score);
            FusedResult {
                result,
                fused_score,
                dense_rank: dense_ranks.get(&id).copied(),
                sparse_rank: sparse_ranks.get(&id).copied(),
                strategy: FusionStrategy::WeightedAverage.as_str().to_string(),
            }
        })
        .collect()
}

/// Reciprocal rank fusion: `Σ over present sides of 1/(k + rank_on_side)`.
/// Tiebreak (DESIGN.md Open Question 5): when fused scores are equal, prefer
/// the passage whose larger individual sub-score is larger, then by id.
fn reciprocal_rank_fusion(
    dense: &[SearchResult],
    sparse: &[SearchResult],
    config: &FusionConfig,
) -> Vec<FusedResult> {
    let dense_by_id = index_by_id(dense);
    let sparse_by_id = index_by_id(sparse);
    let dense_ranks = ranks_by_id(dense);
    let sparse_ranks = ranks_by_id(sparse);

    let mut all_ids: Vec<u32> = dense_by_id.keys().chain(sparse_by_id.keys()).copied().collect();
    all_ids.sort_unstable();
    all_ids.dedup();

    let k = config.fusion_k as f32;
    all_ids
        .into_iter()
        .map(|id| {
            let d = dense_by_id.get(&id);
            let s = sparse_by_id.get(&id);
            let mut rrf_score = 0.0f32;
            if let Some(rank) = dense_ranks.get(&id) {
                rrf_score += 1.0 / (k + *rank as f32);
            }
            if let Some(rank) = sparse_ranks.get(&id) {
                rrf_score += 1.0 / (k + *rank as f32);
            }
            let dense_score = d.map(|r| r.final_score()).unwrap_or(0.0);
            let sparse_score = s.map(|r| r.final_score()).unwrap_or(0.0);
            let base = match (d, s) {
                (Some(dr), Some(sr)) => {
                    if dr.final_score() >= sr.final_score() {
                        *dr
                    } else {
                        *sr
                    }
                }
                (Some(dr), None) => *dr,
                (None, Some(sr)) => *sr,
                (None, None) => unreachable!("id came from one of the two maps"),
            };
            let mut result = base.clone();
            result.tag("rrf_score", rrf_score);
            result.tag("dense_rank", dense_ranks.get(&id).copied().unwrap_or(0));
            result.tag("sparse_rank", sparse_ranks.get(&id).copied().unwrap_or(0));
            result.tag("dense_score", dense_score);
            result.tag("sparse_score", sparse_score);
            FusedResult {
                result,
                fused_score: rrf_score,
                dense_rank: dense_ranks.get(&id).copied(),
                sparse_rank: sparse_ranks.get(&id).copied(),
                strategy: FusionStrategy::ReciprocalRankFusion.as_str().to_string(),
            }
        })
        .collect()
}

/// Interleave dense/sparse results, skipping duplicates. Fused score is
/// inherited from the source list (§4.6).
fn interleaved(dense: &[SearchResult], sparse: &[SearchResult]) -> Vec<FusedResult> {
    let mut out = Vec::with_capacity(dense.len() + sparse.len());
    let mut seen = std::collections::HashSet::new();
    let dense_ranks = ranks_by_id(dense);
    let sparse_ranks = ranks_by_id(sparse);

    let (mut di, mut si) = (0usize, 0usize);
    let mut use_dense = true;
    while di < dense.len() || si < sparse.len() {
        let mut picked: Option<&SearchResult> = None;
        if use_dense && di < dense.len() {
            let candidate = &dense[di];
            if seen.insert(candidate.passage.id) {
                picked = Some(candidate);
            }
            di += 1;
        } else if si < sparse.len() {
            let candidate = &sparse[si];
            if seen.insert(candidate.passage.id) {
                picked = Some(candidate);
            }
            si += 1;
        }

        if let Some(result) = picked {
            let mut result = result.clone();
            result.tag("interleaved_position", (out.len() + 1) as u32);
            out.push(FusedResult {
                fused_score: result.final_score(),
                dense_rank: dense_ranks.get(&result.passage.id).copied(),
                sparse_rank: sparse_ranks.get(&result.passage.id).copied(),
                result,
                strategy: FusionStrategy::Interleaved.as_str().to_string(),
            });
        }
        use_dense = !use_dense;
    }
    out
}

/// Score-threshold fusion: dense-priority pass, then sparse-priority pass,
/// then weighted-average for the remainder (§4.6).
fn score_threshold(dense: &[SearchResult], sparse: &[SearchResult], config: &FusionConfig) -> Vec<FusedResult> {
    let dense_ranks = ranks_by_id(dense);
    let sparse_ranks = ranks_by_id(sparse);
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for r in dense {
        if r.final_score() >= config.min_dense_score && seen.insert(r.passage.id) {
            let mut result = r.clone();
            result.tag("threshold_method", "dense_priority");
            out.push(FusedResult {
                fused_score: result.final_score(),
                dense_rank: dense_ranks.get(&r.passage.id).copied(),
                sparse_rank: None,
                result,
                strategy: FusionStrategy::ScoreThreshold.as_str().to_string(),
            });
        }
    }

    for r in sparse {
        if r.final_score() >= config.min_sparse_score && seen.insert(r.passage.id) {
            let mut result = r.clone();
            result.tag("threshold_method", "sparse_priority");
            out.push(FusedResult {
                fused_score: result.final_score(),
                dense_rank: None,
                sparse_rank: sparse_ranks.get(&r.passage.id).copied(),
                result,
                strategy: FusionStrategy::ScoreThreshold.as_str().to_string(),
            });
        }
    }

    let remaining_dense: Vec<SearchResult> = dense.iter().filter(|r| !seen.contains(&r.passage.id)).cloned().collect();
    let remaining_sparse: Vec<SearchResult> = sparse
        .iter()
        .filter(|r| !seen.contains(&r.passage.id))
        .cloned()
        .collect();

    for mut fused in weighted_average(&remaining_dense, &remaining_sparse, config) {
        fused.result.tag("threshold_method", "weighted_remaining");
        fused.strategy = FusionStrategy::ScoreThreshold.as_str().to_string();
        out.push(fused);
    }

    out
}

/// Higher of the two pre-fusion sub-scores a result carries, used only to
/// break ties between equal fused scores.
fn sub_score_tiebreak(f: &FusedResult) -> f32 {
    let dense_score = f
        .result
        .metadata
        .get("dense_score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32;
    let sparse_score = f
        .result
        .metadata
        .get("sparse_score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32;
    dense_score.max(sparse_score)
}

/// Fuse `dense` and `sparse` ranked lists per `config.strategy`, apply the
/// global `min_relevance` filter, sort descending, assign ranking positions,
/// and tag each result's metadata.
pub fn fuse(
    dense: &[SearchResult],
    sparse: &[SearchResult],
    config: &FusionConfig,
    limit: usize,
    min_relevance: f32,
) -> Result<Vec<FusedResult>, FusionError> {
    config.validate()?;
    check_no_duplicates(dense)?;
    check_no_duplicates(sparse)?;

    let mut fused = match config.strategy {
        FusionStrategy::WeightedAverage => weighted_average(dense, sparse, config),
        FusionStrategy::ReciprocalRankFusion => reciprocal_rank_fusion(dense, sparse, config),
        FusionStrategy::Interleaved => interleaved(dense, sparse),
        FusionStrategy::ScoreThreshold => score_threshold(dense, sparse, config),
    };

    fused.retain(|f| f.fused_score >= min_relevance);
    // Tiebreak (DESIGN.md Open Question 5): larger individual sub-score wins,
    // then passage id ascending for determinism.
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| sub_score_tiebreak(b).partial_cmp(&sub_score_tiebreak(a)).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.result.passage.id.cmp(&b.result.passage.id))
    });
    fused.truncate(limit);

    for (i, f) in fused.iter_mut().enumerate() {
        f.result.ranking_position = (i + 1) as u32;
        f.result.tag("retrieval_method", RetrievalMethod::Hybrid.as_str());
        f.result.tag("hybrid_strategy", f.strategy.clone());
        f.result.enhanced_score = Some(f.fused_score);
    }

    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Passage;

    fn result(id: u32, score: f32) -> SearchResult {
        SearchResult::new(Passage::new(id, 0, "text"), score, "query")
    }

    #[test]
    fn weighted_average_matches_worked_scenario() {
        let dense = vec![result(1, 0.9), result(2, 0.6)];
        let sparse = vec![result(1, 0.6), result(3, 0.8)];
        let config = FusionConfig {
            dense_weight: 0.7,
            sparse_weight: 0.3,
            strategy: FusionStrategy::WeightedAverage,
            ..FusionConfig::default()
        };
        let fused = fuse(&dense, &sparse, &config, 10, 0.0).unwrap();

        let by_id: HashMap<u32, f32> = fused.iter().map(|f| (f.result.passage.id, f.fused_score)).collect();
        assert!((by_id[&1] - 0.81).abs() < 1e-5);
        assert!((by_id[&3] - 0.24).abs() < 1e-5);
        assert!((by_id[&2] - 0.42).abs() < 1e-5);
        assert_eq!(fused[0].result.passage.id, 1);
        assert_eq!(fused[1].result.passage.id, 2);
        assert_eq!(fused[2].result.passage.id, 3);
    }

    #[test]
    fn rrf_matches_worked_scenario() {
        let dense = vec![result(1, 0.9), result(2, 0.6)];
        let sparse = vec![result(1, 0.6), result(3, 0.8)];
        let config = FusionConfig {
            strategy: FusionStrategy::ReciprocalRankFusion,
            fusion_k: 60,
            ..FusionConfig::default()
        };
        let fused = fuse(&dense, &sparse, &config, 10, 0.0).unwrap();
        let by_id: HashMap<u32, f32> = fused.iter().map(|f| (f.result.passage.id, f.fused_score)).collect();
        assert!((by_id[&1] - (1.0 / 61.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((by_id[&2] - (1.0 / 62.0)).abs() < 1e-6);
        assert!((by_id[&3] - (1.0 / 62.0)).abs() < 1e-6);
        assert_eq!(fused[0].result.passage.id, 1);
        // id2 and id3 tie on fused score; id3's sparse sub-score (0.8) beats
        // id2's dense sub-score (0.6), so id3 must rank above id2.
        assert_eq!(fused[1].result.passage.id, 3);
        assert_eq!(fused[2].result.passage.id, 2);
    }

    #[test]
    fn fused_results_have_no_duplicate_ids() {
        let dense = vec![result(1, 0.9), result(2, 0.6)];
        let sparse = vec![result(1, 0.6), result(3, 0.8)];
        let config = FusionConfig::default();
        let fused = fuse(&dense, &sparse, &config, 10, 0.0).unwrap();
        let mut ids: Vec<u32> = fused.iter().map(|f| f.result.passage.id).collect();
        let original_len = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), original_len);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let dense = vec![result(1, 0.9)];
        let sparse: Vec<SearchResult> = vec![];
        let config = FusionConfig {
            dense_weight: 0.5,
            sparse_weight: 0.2,
            ..FusionConfig::default()
        };
        let err = fuse(&dense, &sparse, &config, 10, 0.0);
        assert!(matches!(err, Err(FusionError::InvalidWeights { .. })));
    }

    #[test]
    fn interleaved_skips_duplicates_across_sides() {
        let dense = vec![result(1, 0.9), result(2, 0.5)];
        let sparse = vec![result(1, 0.6), result(3, 0.4)];
        let config = FusionConfig {
            strategy: FusionStrategy::Interleaved,
            ..FusionConfig::default()
        };
        let fused = fuse(&dense, &sparse, &config, 10, 0.0).unwrap();
        let mut ids: Vec<u32> = fused.iter().map(|f| f.result.passage.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
