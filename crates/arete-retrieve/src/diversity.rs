//! Diversity selector (C8): MMR, clustering, semantic-distance, and hybrid
//! strategies for reducing redundancy in a ranked list.
//!
//! Grounded on `diversity_service.py` — the four private `_*_diversify`
//! methods, `_calculate_topical_diversity`/`_calculate_semantic_novelty`, and
//! the k-means clustering loop (hand-rolled here instead of pulling
//! scikit-learn's `KMeans`, matching the teacher's own preference for
//! hand-rolled numeric algorithms over heavyweight dependencies).

use crate::error::DiversityError;
use crate::model::{DiversifiedResult, SearchResult};
use crate::simd::cosine;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

const TOPICAL_CONCEPTS: &[&str] = &[
    "virtue",
    "justice",
    "wisdom",
    "courage",
    "temperance",
    "knowledge",
    "truth",
    "beauty",
    "good",
    "evil",
    "soul",
    "mind",
    "body",
    "reason",
    "emotion",
    "ethics",
    "morality",
    "politics",
    "metaphysics",
    "logic",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DiversityMethod {
    Mmr,
    Clustering,
    SemanticDistance,
    Hybrid,
}

impl DiversityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiversityMethod::Mmr => "mmr",
            DiversityMethod::Clustering => "clustering",
            DiversityMethod::SemanticDistance => "semantic_distance",
            DiversityMethod::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiversityConfig {
    pub method: DiversityMethod,
    pub lambda: f32,
    pub similarity_threshold: f32,
    pub num_clusters: usize,
    pub min_cluster_size: usize,
    pub max_results: usize,
    pub diversity_weight: f32,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            method: DiversityMethod::Mmr,
            lambda: 0.7,
            similarity_threshold: 0.85,
            num_clusters: 5,
            min_cluster_size: 2,
            max_results: 50,
            diversity_weight: 0.3,
        }
    }
}

fn zero_vec(dim: usize) -> Vec<f32> {
    vec![0.0; dim]
}

fn embedding_or_zero(result: &SearchResult, dim: usize) -> Vec<f32> {
    result.passage.embedding.clone().unwrap_or_else(|| zero_vec(dim))
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine(a, b)
}

/// Fraction of [`TOPICAL_CONCEPTS`] appearing in `text` but not in any of
/// `others`, boosted by a 0.5 base; texts with no tracked concepts score 0.5
/// neutral (§4.8).
fn topical_diversity(text: &str, others: &[&str]) -> f32 {
    let text_lower = text.to_lowercase();
    let present: Vec<&str> = TOPICAL_CONCEPTS.iter().copied().filter(|c| text_lower.contains(c)).collect();
    if present.is_empty() {
        return 0.5;
    }
    let unique_count = present
        .iter()
        .filter(|c| !others.iter().any(|o| o.to_lowercase().contains(*c)))
        .count();
    (unique_count as f32 / present.len() as f32 + 0.5).min(1.0)
}

/// `1 - max cosine similarity to any other candidate` (§4.8).
fn semantic_novelty(embedding: &[f32], others: &[Vec<f32>]) -> f32 {
    let max_sim = others.iter().map(|o| cosine(embedding, o)).fold(0.0f32, f32::max);
    1.0 - max_sim
}

fn mmr_select(candidates: &[SearchResult], dim: usize, config: &DiversityConfig) -> Vec<DiversifiedResult> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    remaining.sort_by(|&a, &b| {
        candidates[b]
            .final_score()
            .partial_cmp(&candidates[a].final_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| candidates[a].passage.id.cmp(&candidates[b].passage.id))
    });

    let embeddings: Vec<Vec<f32>> = candidates.iter().map(|r| embedding_or_zero(r, dim)).collect();

    let mut selected: Vec<usize> = vec![remaining.remove(0)];
    let distance_floor = 1.0 - config.similarity_threshold;

    while !remaining.is_empty() && selected.len() < config.max_results {
        let mut best_idx = 0usize;
        let mut best_score = f32::MIN;
        let mut best_distance = 0.0f32;

        for (pos, &idx) in remaining.iter().enumerate() {
            let min_dist = selected
                .iter()
                .map(|&s| distance(&embeddings[idx], &embeddings[s]))
                .fold(f32::MAX, f32::min);
            let combined = config.lambda * candidates[idx].final_score() + (1.0 - config.lambda) * min_dist;
            if combined > best_score
                || (combined == best_score && candidates[idx].passage.id < candidates[remaining[best_idx]].passage.id)
            {
                best_score = combined;
                best_distance = min_dist;
                best_idx = pos;
            }
        }

        if config.lambda < 1.0 && best_distance < distance_floor {
            break;
        }
        selected.push(remaining.remove(best_idx));
    }

    build_diversified(candidates, &selected, &embeddings, config)
}

fn build_diversified(
    candidates: &[SearchResult],
    selected: &[usize],
    embeddings: &[Vec<f32>],
    config: &DiversityConfig,
) -> Vec<DiversifiedResult> {
    let texts: Vec<&str> = candidates.iter().map(|r| r.passage.text.as_str()).collect();
    selected
        .iter()
        .map(|&idx| {
            let others: Vec<Vec<f32>> = selected
                .iter()
                .filter(|&&s| s != idx)
                .map(|&s| embeddings[s].clone())
                .collect();
            let others_text: Vec<&str> = selected.iter().filter(|&&s| s != idx).map(|&s| texts[s]).collect();
            let novelty = semantic_novelty(&embeddings[idx], &others);
            let topical = topical_diversity(texts[idx], &others_text);
            let diversity_score = if config.method == DiversityMethod::SemanticDistance {
                0.5 * candidates[idx].final_score() + 0.5 * novelty
            } else {
                novelty
            };
            DiversifiedResult {
                original_result: candidates[idx].clone(),
                diversity_score,
                cluster_id: None,
                cluster_center_distance: None,
                uniqueness_score: novelty,
                topical_diversity: topical,
                semantic_novelty: novelty,
            }
        })
        .collect()
}

fn semantic_distance_select(candidates: &[SearchResult], dim: usize, config: &DiversityConfig) -> Vec<DiversifiedResult> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    remaining.sort_by(|&a, &b| {
        candidates[b]
            .final_score()
            .partial_cmp(&candidates[a].final_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let embeddings: Vec<Vec<f32>> = candidates.iter().map(|r| embedding_or_zero(r, dim)).collect();

    let mut selected: Vec<usize> = vec![remaining.remove(0)];
    let distance_floor = 1.0 - config.similarity_threshold;

    while !remaining.is_empty() && selected.len() < config.max_results {
        let mut best_idx = 0usize;
        let mut best_distance = f32::MIN;
        for (pos, &idx) in remaining.iter().enumerate() {
            let min_dist = selected
                .iter()
                .map(|&s| distance(&embeddings[idx], &embeddings[s]))
                .fold(f32::MAX, f32::min);
            if min_dist > best_distance {
                best_distance = min_dist;
                best_idx = pos;
            }
        }
        if best_distance < distance_floor {
            break;
        }
        selected.push(remaining.remove(best_idx));
    }

    build_diversified(candidates, &selected, &embeddings, config)
}

fn kmeans(embeddings: &[Vec<f32>], k: usize, dim: usize) -> Vec<usize> {
    if embeddings.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(embeddings.len());
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut indices: Vec<usize> = (0..embeddings.len()).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = indices[..k].iter().map(|&i| embeddings[i].clone()).collect();

    let mut assignments = vec![0usize; embeddings.len()];
    for _ in 0..25 {
        let mut changed = false;
        for (i, emb) in embeddings.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = euclidean(emb, centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            if assignments[i] != best {
                changed = true;
                assignments[i] = best;
            }
        }
        if !changed {
            break;
        }
        for c in 0..k {
            let members: Vec<&Vec<f32>> = embeddings
                .iter()
                .zip(&assignments)
                .filter(|(_, &a)| a == c)
                .map(|(e, _)| e)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mut centroid = vec![0.0f32; dim];
            for m in &members {
                for (i, v) in m.iter().enumerate() {
                    centroid[i] += v;
                }
            }
            for v in &mut centroid {
                *v /= members.len() as f32;
            }
            centroids[c] = centroid;
        }
    }
    assignments
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

fn clustering_select(candidates: &[SearchResult], dim: usize, config: &DiversityConfig) -> Vec<DiversifiedResult> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let embeddings: Vec<Vec<f32>> = candidates.iter().map(|r| embedding_or_zero(r, dim)).collect();
    let k = config.num_clusters.min(candidates.len()).max(1);
    let assignments = kmeans(&embeddings, k, dim);

    let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in assignments.iter().enumerate() {
        clusters[c].push(i);
    }

    let centroids: Vec<Vec<f32>> = (0..k)
        .map(|c| {
            let members = &clusters[c];
            if members.is_empty() {
                return zero_vec(dim);
            }
            let mut centroid = vec![0.0f32; dim];
            for &i in members {
                for (d, v) in embeddings[i].iter().enumerate() {
                    centroid[d] += v;
                }
            }
            for v in &mut centroid {
                *v /= members.len() as f32;
            }
            centroid
        })
        .collect();

    let mut out = Vec::new();
    for (cluster_id, members) in clusters.iter().enumerate() {
        if members.len() < config.min_cluster_size {
            continue;
        }
        let best = *members
            .iter()
            .max_by(|&&a, &&b| {
                candidates[a]
                    .final_score()
                    .partial_cmp(&candidates[b].final_score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty cluster has a max member");
        let dist = euclidean(&embeddings[best], &centroids[cluster_id]);
        let diversity_score = (0.9 - 0.3 * dist).max(0.0);
        let others_text: Vec<&str> = candidates
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != best)
            .map(|(_, r)| r.passage.text.as_str())
            .collect();
        let others_emb: Vec<Vec<f32>> = embeddings.iter().enumerate().filter(|&(i, _)| i != best).map(|(_, e)| e.clone()).collect();
        out.push(DiversifiedResult {
            original_result: candidates[best].clone(),
            diversity_score,
            cluster_id: Some(cluster_id as u32),
            cluster_center_distance: Some(dist),
            uniqueness_score: semantic_novelty(&embeddings[best], &others_emb),
            topical_diversity: topical_diversity(&candidates[best].passage.text, &others_text),
            semantic_novelty: semantic_novelty(&embeddings[best], &others_emb),
        });
    }

    out.sort_by(|a, b| {
        b.original_result
            .final_score()
            .partial_cmp(&a.original_result.final_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.original_result.passage.id.cmp(&b.original_result.passage.id))
    });
    out.truncate(config.max_results);
    out
}

fn hybrid_select(candidates: &[SearchResult], dim: usize, config: &DiversityConfig) -> Vec<DiversifiedResult> {
    let mmr = mmr_select(candidates, dim, config);
    let clustering = clustering_select(candidates, dim, config);
    let semantic = semantic_distance_select(candidates, dim, config);

    let mut merged: std::collections::HashMap<u32, DiversifiedResult> = std::collections::HashMap::new();
    for r in mmr.into_iter().chain(clustering).chain(semantic) {
        merged
            .entry(r.original_result.passage.id)
            .and_modify(|existing| {
                if r.diversity_score > existing.diversity_score {
                    *existing = r.clone();
                }
            })
            .or_insert(r);
    }

    let embeddings: Vec<Vec<f32>> = candidates.iter().map(|r| embedding_or_zero(r, dim)).collect();
    let texts: Vec<&str> = candidates.iter().map(|r| r.passage.text.as_str()).collect();
    let mut out: Vec<DiversifiedResult> = merged
        .into_values()
        .map(|mut r| {
            let self_idx = candidates.iter().position(|c| c.passage.id == r.original_result.passage.id);
            if let Some(idx) = self_idx {
                let others_emb: Vec<Vec<f32>> = embeddings.iter().enumerate().filter(|&(i, _)| i != idx).map(|(_, e)| e.clone()).collect();
                let others_text: Vec<&str> = texts.iter().enumerate().filter(|&(i, _)| i != idx).map(|(_, &t)| t).collect();
                let topical = topical_diversity(texts[idx], &others_text);
                let semantic_nov = semantic_novelty(&embeddings[idx], &others_emb);
                r.topical_diversity = topical;
                r.semantic_novelty = semantic_nov;
                r.diversity_score = (topical + semantic_nov) / 2.0;
            }
            r
        })
        .collect();

    out.sort_by(|a, b| {
        let a_final = 0.7 * a.original_result.final_score() + 0.3 * a.diversity_score;
        let b_final = 0.7 * b.original_result.final_score() + 0.3 * b.diversity_score;
        b_final
            .partial_cmp(&a_final)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.original_result.passage.id.cmp(&b.original_result.passage.id))
    });
    out.truncate(config.max_results);
    out
}

/// Diversify `candidates` per `config.method` (C8).
pub fn diversify(candidates: &[SearchResult], config: &DiversityConfig) -> Result<Vec<DiversifiedResult>, DiversityError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let dim = candidates
        .iter()
        .find_map(|r| r.passage.embedding.as_ref().map(|e| e.len()))
        .unwrap_or(0);

    let results = match config.method {
        DiversityMethod::Mmr => mmr_select(candidates, dim, config),
        DiversityMethod::Clustering => clustering_select(candidates, dim, config),
        DiversityMethod::SemanticDistance => semantic_distance_select(candidates, dim, config),
        DiversityMethod::Hybrid => hybrid_select(candidates, dim, config),
    };
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Passage;

    fn candidate(id: u32, score: f32, embedding: Vec<f32>) -> SearchResult {
        SearchResult::new(Passage::new(id, 0, "text"), score, "query").with_embedding_for_test(embedding)
    }

    trait WithEmbeddingForTest {
        fn with_embedding_for_test(self, embedding: Vec<f32>) -> Self;
    }
    impl WithEmbeddingForTest for SearchResult {
        fn with_embedding_for_test(mut self, embedding: Vec<f32>) -> Self {
            self.passage.embedding = Some(embedding);
            self
        }
    }

    #[test]
    fn mmr_with_lambda_one_preserves_relevance_order() {
        let candidates = vec![
            candidate(1, 0.9, vec![1.0, 0.0]),
            candidate(2, 0.5, vec![0.0, 1.0]),
            candidate(3, 0.7, vec![1.0, 1.0]),
        ];
        let config = DiversityConfig {
            method: DiversityMethod::Mmr,
            lambda: 1.0,
            ..DiversityConfig::default()
        };
        let results = diversify(&candidates, &config).unwrap();
        let ids: Vec<u32> = results.iter().map(|r| r.original_result.passage.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn mmr_rejects_near_duplicate() {
        let candidates = vec![
            candidate(1, 0.9, vec![1.0, 0.05]),
            candidate(2, 0.85, vec![0.99, 0.1]),
            candidate(3, 0.6, vec![0.0, 1.0]),
            candidate(4, 0.5, vec![-1.0, 0.0]),
        ];
        let config = DiversityConfig {
            method: DiversityMethod::Mmr,
            lambda: 0.5,
            similarity_threshold: 0.85,
            max_results: 10,
            ..DiversityConfig::default()
        };
        let results = diversify(&candidates, &config).unwrap();
        let ids: HashSet<u32> = results.iter().map(|r| r.original_result.passage.id).collect();
        assert!(ids.contains(&1));
    }

    #[test]
    fn empty_candidates_yield_empty_results_not_error() {
        let results = diversify(&[], &DiversityConfig::default()).unwrap();
        assert!(results.is_empty());
    }
}
