//! Inverted index (C1): term→postings map, document-frequency table, and
//! length statistics that the BM25 (C2) and sparse-with-expansion (C3)
//! scorers read from.
//!
//! Grounded on the teacher's `bm25.rs::InvertedIndex` — postings map,
//! document-frequency table, lazily-recomputed IDF cache behind a
//! `RefCell` — generalized here to operate over [`Passage`] and to support
//! `remove` (the teacher's index was append-only).

use crate::error::IndexingError;
use crate::model::{Passage, PassageId};
use crate::tokenize::tokenize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Totals exposed for observability (`stats()`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexStats {
    pub num_passages: u32,
    pub vocabulary_size: usize,
    pub avg_doc_length: f32,
}

/// Term→(passage→term-frequency) postings, document-frequency table, and
/// running length statistics over a collection of passages.
///
/// IDF values are lazily recomputed: mutation clears the cache and the next
/// read rebuilds it, rather than recomputing on every `add`/`remove` — this
/// matters when building an index from a large batch one passage at a time.
pub struct InvertedIndex {
    postings: HashMap<String, HashMap<PassageId, u32>>,
    /// Terms present in each passage, kept so `remove` can decrement
    /// document frequencies without scanning the whole postings table.
    doc_terms: HashMap<PassageId, HashSet<String>>,
    doc_lengths: HashMap<PassageId, u32>,
    doc_frequencies: HashMap<String, u32>,
    num_docs: u32,
    avg_doc_length: f32,
    precomputed_idf: RefCell<HashMap<String, f32>>,
    idf_computed_at_num_docs: RefCell<u32>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self {
            postings: HashMap::new(),
            doc_terms: HashMap::new(),
            doc_lengths: HashMap::new(),
            doc_frequencies: HashMap::new(),
            num_docs: 0,
            avg_doc_length: 0.0,
            precomputed_idf: RefCell::new(HashMap::new()),
            idf_computed_at_num_docs: RefCell::new(0),
        }
    }

    /// Add a passage to the index. Re-indexing an id already present
    /// replaces the prior entry (remove-then-add, atomic to readers since
    /// both halves run before any reader can observe the index again).
    ///
    /// Empty text (or text that tokenizes to nothing) is permitted: the
    /// passage is stored and contributes zero to any BM25 score.
    pub fn add(&mut self, passage: &Passage) -> Result<(), IndexingError> {
        if self.doc_lengths.contains_key(&passage.id) {
            self.remove(passage.id);
        }

        let terms = tokenize(&passage.text);
        let doc_length = terms.len() as u32;
        self.doc_lengths.insert(passage.id, doc_length);

        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            *term_freqs.entry(term.clone()).or_insert(0) += 1;
        }

        let mut present_terms = HashSet::with_capacity(term_freqs.len());
        for (term, freq) in term_freqs {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(passage.id, freq);
            *self.doc_frequencies.entry(term.clone()).or_insert(0) += 1;
            present_terms.insert(term);
        }
        self.doc_terms.insert(passage.id, present_terms);

        self.num_docs += 1;
        self.recompute_avg_doc_length();
        self.invalidate_idf();
        Ok(())
    }

    /// Remove a passage. Decrements `df` for each of its distinct terms,
    /// dropping the term from the vocabulary once `df` reaches zero. A
    /// no-op (not an error) if the id is not present.
    pub fn remove(&mut self, passage_id: PassageId) {
        let Some(terms) = self.doc_terms.remove(&passage_id) else {
            return;
        };
        for term in &terms {
            if let Some(postings) = self.postings.get_mut(term) {
                postings.remove(&passage_id);
                if postings.is_empty() {
                    self.postings.remove(term);
                }
            }
            if let Some(df) = self.doc_frequencies.get_mut(term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    self.doc_frequencies.remove(term);
                }
            }
        }
        self.doc_lengths.remove(&passage_id);
        self.num_docs = self.num_docs.saturating_sub(1);
        self.recompute_avg_doc_length();
        self.invalidate_idf();
    }

    fn recompute_avg_doc_length(&mut self) {
        if self.num_docs == 0 {
            self.avg_doc_length = 0.0;
            return;
        }
        let total: u32 = self.doc_lengths.values().sum();
        self.avg_doc_length = total as f32 / self.num_docs as f32;
    }

    fn invalidate_idf(&mut self) {
        self.precomputed_idf.borrow_mut().clear();
        *self.idf_computed_at_num_docs.borrow_mut() = 0;
    }

    /// Recompute all IDF values if stale. Lazy: only runs when `num_docs`
    /// has changed since the cache was last built.
    pub(crate) fn ensure_idf_computed(&self) {
        let computed_at = *self.idf_computed_at_num_docs.borrow();
        if computed_at == self.num_docs && !self.precomputed_idf.borrow().is_empty() {
            return;
        }
        let mut idf_map = self.precomputed_idf.borrow_mut();
        idf_map.clear();
        let n = self.num_docs as f32;
        for (term, df) in &self.doc_frequencies {
            let df_f = *df as f32;
            if df_f > 0.0 {
                idf_map.insert(term.clone(), ((n - df_f + 0.5) / (df_f + 0.5)).ln());
            }
        }
        *self.idf_computed_at_num_docs.borrow_mut() = self.num_docs;
    }

    /// Inverse document frequency: `ln((N - df + 0.5) / (df + 0.5))`, `0.0`
    /// for unseen terms. Uses the lazily-recomputed cache.
    pub fn idf(&self, term: &str) -> f32 {
        self.ensure_idf_computed();
        if let Some(&idf) = self.precomputed_idf.borrow().get(term) {
            return idf;
        }
        let df = self.doc_frequencies.get(term).copied().unwrap_or(0) as f32;
        if df == 0.0 {
            return 0.0;
        }
        let n = self.num_docs as f32;
        ((n - df + 0.5) / (df + 0.5)).ln()
    }

    pub fn df(&self, term: &str) -> u32 {
        self.doc_frequencies.get(term).copied().unwrap_or(0)
    }

    pub fn tf(&self, term: &str, passage_id: PassageId) -> u32 {
        self.postings
            .get(term)
            .and_then(|p| p.get(&passage_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn postings(&self, term: &str) -> Option<&HashMap<PassageId, u32>> {
        self.postings.get(term)
    }

    pub fn document_length(&self, passage_id: PassageId) -> u32 {
        self.doc_lengths.get(&passage_id).copied().unwrap_or(0)
    }

    pub fn document_ids(&self) -> impl Iterator<Item = PassageId> + '_ {
        self.doc_lengths.keys().copied()
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn avg_doc_length(&self) -> f32 {
        self.avg_doc_length
    }

    pub fn vocabulary_size(&self) -> usize {
        self.doc_frequencies.len()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            num_passages: self.num_docs,
            vocabulary_size: self.vocabulary_size(),
            avg_doc_length: self.avg_doc_length,
        }
    }

    /// Candidate passage ids: the union of postings for every query term.
    /// Avoids scanning the full collection (§4.2's "do not iterate the
    /// full collection" instruction).
    pub(crate) fn candidates(&self, query_terms: &[String]) -> Vec<PassageId> {
        let estimated = query_terms.len() * 64;
        let mut seen: HashSet<PassageId> = HashSet::with_capacity(estimated);
        let mut out: Vec<PassageId> = Vec::with_capacity(estimated);
        for term in query_terms {
            if let Some(postings) = self.postings.get(term) {
                for &id in postings.keys() {
                    if seen.insert(id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: u32, text: &str) -> Passage {
        Passage::new(id, 0, text)
    }

    #[test]
    fn df_matches_postings_cardinality() {
        let mut idx = InvertedIndex::new();
        idx.add(&passage(0, "virtue is excellence of character")).unwrap();
        idx.add(&passage(1, "justice concerns fairness")).unwrap();
        idx.add(&passage(2, "virtue and wisdom are linked")).unwrap();

        for term in ["virtue", "justice", "wisdom"] {
            let postings_len = idx.postings(term).map(|p| p.len()).unwrap_or(0) as u32;
            assert_eq!(idx.df(term), postings_len);
        }
    }

    #[test]
    fn add_then_remove_restores_empty_index() {
        let mut idx = InvertedIndex::new();
        let p = passage(0, "virtue and wisdom");
        idx.add(&p).unwrap();
        assert_eq!(idx.num_docs(), 1);
        idx.remove(p.id);
        assert_eq!(idx.num_docs(), 0);
        assert_eq!(idx.vocabulary_size(), 0);
        assert_eq!(idx.avg_doc_length(), 0.0);
        assert_eq!(idx.df("virtue"), 0);
    }

    #[test]
    fn reindexing_same_id_replaces_prior_entry() {
        let mut idx = InvertedIndex::new();
        idx.add(&passage(0, "virtue and wisdom")).unwrap();
        idx.add(&passage(0, "justice alone")).unwrap();
        assert_eq!(idx.num_docs(), 1);
        assert_eq!(idx.df("virtue"), 0);
        assert_eq!(idx.df("justice"), 1);
    }

    #[test]
    fn empty_text_is_stored_without_error() {
        let mut idx = InvertedIndex::new();
        assert!(idx.add(&passage(0, "")).is_ok());
        assert_eq!(idx.num_docs(), 1);
        assert_eq!(idx.document_length(0), 0);
    }
}
