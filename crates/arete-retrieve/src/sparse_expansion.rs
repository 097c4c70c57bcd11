//! Sparse-with-expansion scorer (C3): a BM25-like base plus two additive
//! heuristic components — per-term importance and co-occurrence-based term
//! expansion.
//!
//! Grounded on `sparse_retrieval_service.py::SPLADERetriever`. A hand-rolled
//! fallback per §4.3/§1's explicit non-goal of learned sparse expansion; a
//! trained model can be substituted behind the same `score` contract.

use crate::bm25::{Bm25Params, Bm25Scorer, ScoreFilter};
use crate::index::InvertedIndex;
use crate::model::{Passage, PassageId, RetrievalMethod, SearchResult};
use crate::tokenize::tokenize;
use std::collections::{HashMap, HashSet};

/// Curated philosophical glossary receiving a term-importance boost (§4.3).
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
    "sophia",
    "episteme",
];

const GLOSSARY_BOOST: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparseExpansionParams {
    pub bm25: Bm25Params,
    /// Multiplier applied to the co-occurrence expansion contribution (default 1.5).
    pub expansion_factor: f32,
    /// Minimum co-occurrence value for a non-query term to contribute (default 0.1).
    pub importance_threshold: f32,
}

impl Default for SparseExpansionParams {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            expansion_factor: 1.5,
            importance_threshold: 0.1,
        }
    }
}

/// Sparse-with-expansion scorer (C3).
pub struct SparseExpansionScorer {
    pub params: SparseExpansionParams,
    base: Bm25Scorer,
}

impl SparseExpansionScorer {
    pub fn new(params: SparseExpansionParams) -> Self {
        let base = Bm25Scorer::new(params.bm25);
        Self { params, base }
    }

    pub fn algorithm_name(&self) -> &'static str {
        "sparse_with_expansion"
    }

    /// Per-term importance weight in `[0, 1]`: `1 / (1 + ln(df))`, boosted
    /// `1.5x` for the curated philosophical glossary.
    fn term_importance(&self, index: &InvertedIndex, term: &str) -> f32 {
        let df = index.df(term);
        if df == 0 {
            return 0.0;
        }
        let mut weight = 1.0 / (1.0 + (df as f32).ln());
        if GLOSSARY.contains(&term) {
            weight *= GLOSSARY_BOOST;
        }
        weight
    }

    /// Average, across query terms, of `|docs containing both| / |docs containing the query term|`.
    fn cooccurrence(&self, index: &InvertedIndex, query_terms: &[String], candidate_term: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let Some(candidate_postings) = index.postings(candidate_term) else {
            return 0.0;
        };

        let mut total = 0.0f32;
        for q in query_terms {
            let Some(q_postings) = index.postings(q) else {
                continue;
            };
            if q_postings.is_empty() {
                continue;
            }
            let common = q_postings.keys().filter(|id| candidate_postings.contains_key(id)).count();
            total += common as f32 / q_postings.len() as f32;
        }
        total / query_terms.len() as f32
    }

    /// Score one passage: BM25 base plus importance and expansion components,
    /// normalized via `min(1, max(0, total / max(len(query_terms)*10, 1)))`.
    pub fn score(&self, index: &InvertedIndex, passage: &Passage, query_terms: &[String]) -> f32 {
        let base_raw = self.base.raw_score(index, passage.id, query_terms);

        let mut importance_total = 0.0f32;
        let mut seen: HashSet<&str> = HashSet::with_capacity(query_terms.len());
        for term in query_terms {
            if !seen.insert(term.as_str()) {
                continue;
            }
            if index.tf(term, passage.id) > 0 {
                importance_total += self.term_importance(index, term);
            }
        }

        let passage_terms = tokenize(&passage.text);
        let mut expansion_total = 0.0f32;
        let mut expansion_seen: HashSet<String> = HashSet::new();
        for term in &passage_terms {
            if query_terms.contains(term) || !expansion_seen.insert(term.clone()) {
                continue;
            }
            let cooc = self.cooccurrence(index, query_terms, term);
            if cooc > self.params.importance_threshold {
                expansion_total += cooc * self.params.expansion_factor;
            }
        }

        let total = base_raw + importance_total + expansion_total;
        let denom = ((query_terms.len() * 10) as f32).max(1.0);
        (total / denom).clamp(0.0, 1.0)
    }

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
        let mut scored: Vec<(PassageId, f32)> = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(passage) = passages.get(&id) else { continue };
            if let Some(f) = filter {
                if !filter_accepts(f, passage) {
                    continue;
                }
            }
            let score = self.score(index, passage, &query_terms);
            if score >= min_relevance {
                scored.push((id, score));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (id, score))| {
                let passage = passages.get(&id).expect("candidate came from passages map");
                let mut result = SearchResult::new(passage.clone(), score, query);
                result.ranking_position = (i + 1) as u32;
                result.tag("retrieval_method", RetrievalMethod::Sparse.as_str());
                result.tag("sparse_algorithm", self.algorithm_name());
                result
            })
            .collect()
    }
}

fn filter_accepts(f: &ScoreFilter, passage: &Passage) -> bool {
    if let Some(ids) = &f.document_ids {
        if !ids.contains(&passage.document_id) {
            return false;
        }
    }
    if let Some(kinds) = &f.kinds {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn build_corpus() -> (InvertedIndex, HashMap<PassageId, Passage>) {
        let mut index = InvertedIndex::new();
        let mut passages = HashMap::new();
        for (id, text) in [
            (0u32, "virtue is excellence of character and eudaimonia"),
            (1, "justice concerns fairness in the polis"),
            (2, "virtue and wisdom are linked through phronesis"),
        ] {
            let p = Passage::new(id, 0, text);
            index.add(&p).unwrap();
            passages.insert(id, p);
        }
        (index, passages)
    }

    #[test]
    fn glossary_terms_get_boosted_importance() {
        let (index, _) = build_corpus();
        let scorer = SparseExpansionScorer::new(SparseExpansionParams::default());
        let plain = scorer.term_importance(&index, "virtue");
        let unboosted_equivalent = 1.0 / (1.0 + (index.df("virtue") as f32).ln());
        assert!(plain > unboosted_equivalent);
    }

    #[test]
    fn scores_stay_within_unit_interval() {
        let (index, passages) = build_corpus();
        let scorer = SparseExpansionScorer::new(SparseExpansionParams::default());
        let results = scorer.search(&index, &passages, "virtue wisdom", 10, 0.0, None);
        for r in &results {
            assert!(r.relevance_score >= 0.0 && r.relevance_score <= 1.0);
        }
    }

    #[test]
    fn non_matching_query_yields_no_results() {
        let (index, passages) = build_corpus();
        let scorer = SparseExpansionScorer::new(SparseExpansionParams::default());
        let results = scorer.search(&index, &passages, "nonexistent", 10, 0.0, None);
        assert!(results.is_empty());
    }
}
