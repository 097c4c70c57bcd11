//! BM25 scorer (C2): ranks passages against query terms using collection
//! statistics read from [`crate::index::InvertedIndex`].
//!
//! Grounded on the teacher's `bm25.rs` scoring loop and heap-based top-k,
//! generalized over [`Passage`]/[`InvertedIndex`] and corrected to the
//! standard no-`+1` IDF formula per §4.2 (see DESIGN.md Open Question 1 —
//! the teacher's own IDF carried an extra `+ 1.0` inside the log that this
//! spec's grounding source does not use).

use crate::index::InvertedIndex;
use crate::model::{MetadataBag, Passage, PassageId, RetrievalMethod, SearchResult};
use crate::tokenize::tokenize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::collections::HashSet;

/// `k1`/`b` tuning constants (§4.2 defaults: `k1=1.2`, `b=0.75`).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Optional filters applied before scoring (§4.6's document-id/kind filter
/// predicates, shared by every retrieval stage).
#[derive(Debug, Clone, Default)]
pub struct ScoreFilter {
    pub document_ids: Option<HashSet<u32>>,
    pub kinds: Option<HashSet<String>>,
}

impl ScoreFilter {
    fn accepts(&self, passage: &Passage) -> bool {
        if let Some(ids) = &self.document_ids {
            if !ids.contains(&passage.document_id) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            let kind_str = match &passage.kind {
                Some(crate::model::PassageKind::Paragraph) => "paragraph",
                Some(crate::model::PassageKind::Sentence) => "sentence",
                Some(crate::model::PassageKind::Other(s)) => s.as_str(),
                None => return false,
            };
            if !kinds.contains(kind_str) {
                return false;
            }
        }
        true
    }
}

struct ScoredCandidate {
    passage_id: PassageId,
    score: f32,
}

impl PartialEq for ScoredCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl Eq for ScoredCandidate {}
impl PartialOrd for ScoredCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest score first,
        // which lets us keep a bounded min-heap of the top-k candidates.
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.passage_id.cmp(&self.passage_id))
    }
}

/// Okapi BM25 scorer over an [`InvertedIndex`].
pub struct Bm25Scorer {
    pub params: Bm25Params,
}

impl Bm25Scorer {
    pub fn new(params: Bm25Params) -> Self {
        Self { params }
    }

    pub fn algorithm_name(&self) -> &'static str {
        "bm25"
    }

    /// Raw (unnormalized) BM25 score for one passage against a query term list.
    pub fn raw_score(&self, index: &InvertedIndex, passage_id: PassageId, query_terms: &[String]) -> f32 {
        let doc_len = index.document_length(passage_id) as f32;
        let avgdl = if index.avg_doc_length() > 0.0 {
            index.avg_doc_length()
        } else {
            1.0
        };
        let Bm25Params { k1, b } = self.params;

        let mut score = 0.0f32;
        let mut seen: HashSet<&str> = HashSet::with_capacity(query_terms.len());
        for term in query_terms {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let tf = index.tf(term, passage_id) as f32;
            if tf == 0.0 {
                continue;
            }
            let df = index.df(term);
            if df == 0 {
                continue;
            }
            let idf = index.idf(term);
            let numerator = idf * tf * (k1 + 1.0);
            let denominator = tf + k1 * (1.0 - b + b * doc_len / avgdl);
            score += numerator / denominator;
        }
        score
    }

    /// Normalized score in `[0, 1]`: raw score divided by `max(|query terms|, 1)`,
    /// clamped. A deliberate simplification over proper score calibration —
    /// callers must not compare absolute scores across different queries.
    pub fn normalized_score(&self, index: &InvertedIndex, passage_id: PassageId, query_terms: &[String]) -> f32 {
        let raw = self.raw_score(index, passage_id, query_terms);
        let denom = (query_terms.len() as f32).max(1.0);
        (raw / denom).clamp(0.0, 1.0)
    }

    /// Score and rank passages against `query`, scanning only the index's
    /// candidate set (the union of postings for the query's terms) rather
    /// than the full collection.
    pub fn search(
        &self,
        index: &InvertedIndex,
        passages: &HashMap<PassageId, Passage>,
        query: &str,
        limit: usize,
        min_relevance: f32,
        filter: Option<&ScoreFilter>,
    ) -> Vec<SearchResult> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let candidates = index.candidates(&query_terms);
        let mut heap: BinaryHeap<ScoredCandidate> = BinaryHeap::with_capacity(limit + 1);

        for passage_id in candidates {
            let Some(passage) = passages.get(&passage_id) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.accepts(passage) {
                    continue;
                }
            }

            let score = self.normalized_score(index, passage_id, &query_terms);
            if score < min_relevance {
                continue;
            }

            if heap.len() < limit {
                heap.push(ScoredCandidate { passage_id, score });
            } else if let Some(worst) = heap.peek() {
                if score > worst.score {
                    heap.pop();
                    heap.push(ScoredCandidate { passage_id, score });
                }
            }
        }

        let mut scored: Vec<ScoredCandidate> = heap.into_vec();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.passage_id.cmp(&b.passage_id))
        });

        scored
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let passage = passages.get(&c.passage_id).expect("candidate came from passages map");
                let mut result = SearchResult::new(passage.clone(), c.score, query);
                result.ranking_position = (i + 1) as u32;
                result.tag("retrieval_method", RetrievalMethod::Sparse.as_str());
                result
            })
            .collect()
    }
}

pub fn empty_metadata() -> MetadataBag {
    MetadataBag::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InvertedIndex;

    fn build_corpus() -> (InvertedIndex, HashMap<PassageId, Passage>) {
        let mut index = InvertedIndex::new();
        let mut passages = HashMap::new();
        for (id, text) in [
            (0u32, "virtue is excellence of character"),
            (1, "justice concerns fairness"),
            (2, "virtue and wisdom are linked"),
        ] {
            let p = Passage::new(id, 0, text);
            index.add(&p).unwrap();
            passages.insert(id, p);
        }
        (index, passages)
    }

    #[test]
    fn basic_ranking_excludes_non_matching_passage() {
        let (index, passages) = build_corpus();
        let scorer = Bm25Scorer::new(Bm25Params::default());
        let results = scorer.search(&index, &passages, "virtue", 10, 0.0, None);
        let ids: Vec<u32> = results.iter().map(|r| r.passage.id).collect();
        assert!(ids.contains(&0));
        assert!(ids.contains(&2));
        assert!(!ids.contains(&1));
    }

    #[test]
    fn idf_effect_ranks_double_term_match_higher() {
        let (index, passages) = build_corpus();
        let scorer = Bm25Scorer::new(Bm25Params::default());
        let results = scorer.search(&index, &passages, "virtue wisdom", 10, 0.0, None);
        assert_eq!(results[0].passage.id, 2);
        let ids: Vec<u32> = results.iter().map(|r| r.passage.id).collect();
        assert!(ids.contains(&0));
        assert!(!ids.contains(&1));
    }

    #[test]
    fn scores_are_normalized_to_unit_interval() {
        let (index, passages) = build_corpus();
        let scorer = Bm25Scorer::new(Bm25Params::default());
        let results = scorer.search(&index, &passages, "virtue wisdom justice", 10, 0.0, None);
        for r in &results {
            assert!(r.relevance_score >= 0.0 && r.relevance_score <= 1.0);
        }
    }

    #[test]
    fn ranking_positions_are_contiguous_from_one() {
        let (index, passages) = build_corpus();
        let scorer = Bm25Scorer::new(Bm25Params::default());
        let results = scorer.search(&index, &passages, "virtue", 10, 0.0, None);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.ranking_position, (i + 1) as u32);
        }
    }

    #[test]
    fn empty_query_returns_empty_list() {
        let (index, passages) = build_corpus();
        let scorer = Bm25Scorer::new(Bm25Params::default());
        let results = scorer.search(&index, &passages, "", 10, 0.0, None);
        assert!(results.is_empty());
    }

    #[test]
    fn limit_zero_returns_empty_list() {
        let (index, passages) = build_corpus();
        let scorer = Bm25Scorer::new(Bm25Params::default());
        let results = scorer.search(&index, &passages, "virtue", 0, 0.0, None);
        assert!(results.is_empty());
    }
}
