//! Vector store contract (C4) and an in-process brute-force reference
//! implementation.
//!
//! The core does not own ANN index construction (§4.4): it consumes a
//! narrow interface so a caller can swap in a real vector database without
//! touching [`crate::dense`]. Grounded on the teacher's brute-force
//! `DenseRetriever` cosine-similarity scan, generalized behind a trait and
//! given `insert`/`fetch`/filter support the teacher's version lacked.

use crate::error::QueryProcessingError;
use crate::model::{DocumentId, Passage, PassageId};
use crate::simd::cosine;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Optional narrowing applied by [`VectorStore::search_near_vector`].
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub document_ids: Option<HashSet<DocumentId>>,
    pub kinds: Option<HashSet<String>>,
}

impl VectorFilter {
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

/// A similarity hit: passage id and certainty in `[0, 1]`.
pub type VectorHit = (PassageId, f32);

/// Narrow contract over approximate-nearest-neighbor similarity search
/// (§4.4/§6). An embedding provider is assumed upstream; `search_near_text`
/// exists for stores colocated with one (e.g. calling out to Weaviate's own
/// vectorizer) and is unimplemented by the in-memory reference store.
pub trait VectorStore: Send + Sync {
    fn insert(&self, passage: &Passage) -> Result<(), QueryProcessingError>;

    fn batch_insert(&self, passages: &[Passage]) -> Result<(), QueryProcessingError> {
        for p in passages {
            self.insert(p)?;
        }
        Ok(())
    }

    fn fetch(&self, id: PassageId) -> Option<Passage>;

    fn search_near_vector(
        &self,
        vector: &[f32],
        limit: usize,
        min_certainty: f32,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorHit>, QueryProcessingError>;

    /// Store-side embedding + search. The in-memory reference store has no
    /// embedding provider of its own, so this returns an error; a real
    /// deployment wires this to a colocated vectorizer.
    fn search_near_text(
        &self,
        _text: &str,
        _limit: usize,
        _min_certainty: f32,
        _filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorHit>, QueryProcessingError> {
        Err(QueryProcessingError::InvalidParameter(
            "search_near_text requires a store-colocated embedding provider".to_string(),
        ))
    }
}

/// Brute-force in-memory reference implementation (§4.4 "ADDED"): a full
/// cosine-similarity scan over every stored embedding. Not an ANN index —
/// documented as a reference/testing store, not a production-scale one.
pub struct InMemoryVectorStore {
    passages: RwLock<HashMap<PassageId, Passage>>,
    dimension: RwLock<Option<usize>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(HashMap::new()),
            dimension: RwLock::new(None),
        }
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), QueryProcessingError> {
        let mut dim = self.dimension.write().expect("vector store lock poisoned");
        match *dim {
            None => {
                *dim = Some(embedding.len());
                Ok(())
            }
            Some(d) if d == embedding.len() => Ok(()),
            Some(d) => Err(QueryProcessingError::DimensionMismatch {
                query_dim: embedding.len(),
                doc_dim: d,
            }),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn insert(&self, passage: &Passage) -> Result<(), QueryProcessingError> {
        let embedding = passage.embedding.as_ref().ok_or_else(|| {
            QueryProcessingError::InvalidParameter(format!(
                "passage {} has no embedding",
                passage.id
            ))
        })?;
        self.check_dimension(embedding)?;
        self.passages
            .write()
            .expect("vector store lock poisoned")
            .insert(passage.id, passage.clone());
        Ok(())
    }

    fn fetch(&self, id: PassageId) -> Option<Passage> {
        self.passages
            .read()
            .expect("vector store lock poisoned")
            .get(&id)
            .cloned()
    }

    fn search_near_vector(
        &self,
        vector: &[f32],
        limit: usize,
        min_certainty: f32,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorHit>, QueryProcessingError> {
        if let Some(d) = *self.dimension.read().expect("vector store lock poisoned") {
            if d != vector.len() {
                return Err(QueryProcessingError::DimensionMismatch {
                    query_dim: vector.len(),
                    doc_dim: d,
                });
            }
        }

        let passages = self.passages.read().expect("vector store lock poisoned");
        let mut hits: Vec<VectorHit> = passages
            .values()
            .filter(|p| filter.map(|f| f.accepts(p)).unwrap_or(true))
            .filter_map(|p| {
                let emb = p.embedding.as_ref()?;
                let certainty = cosine(vector, emb);
                (certainty >= min_certainty).then_some((p.id, certainty))
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage_with_embedding(id: u32, embedding: Vec<f32>) -> Passage {
        Passage::new(id, 0, "text").with_embedding(embedding)
    }

    #[test]
    fn search_returns_hits_sorted_by_certainty_desc() {
        let store = InMemoryVectorStore::new();
        store.insert(&passage_with_embedding(1, vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        store.insert(&passage_with_embedding(2, vec![0.9, 0.1, 0.0, 0.0])).unwrap();
        store.insert(&passage_with_embedding(3, vec![0.0, 1.0, 0.0, 0.0])).unwrap();

        let hits = store
            .search_near_vector(&[1.0, 0.0, 0.0, 0.0], 10, 0.0, None)
            .unwrap();
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn mismatched_dimension_is_rejected() {
        let store = InMemoryVectorStore::new();
        store.insert(&passage_with_embedding(1, vec![1.0, 0.0])).unwrap();
        let err = store.insert(&passage_with_embedding(2, vec![1.0, 0.0, 0.0]));
        assert!(matches!(err, Err(QueryProcessingError::DimensionMismatch { .. })));
    }

    #[test]
    fn filter_excludes_non_matching_documents() {
        let store = InMemoryVectorStore::new();
        let mut p1 = passage_with_embedding(1, vec![1.0, 0.0]);
        p1.document_id = 10;
        let mut p2 = passage_with_embedding(2, vec![1.0, 0.0]);
        p2.document_id = 20;
        store.insert(&p1).unwrap();
        store.insert(&p2).unwrap();

        let filter = VectorFilter {
            document_ids: Some([10].into_iter().collect()),
            kinds: None,
        };
        let hits = store
            .search_near_vector(&[1.0, 0.0], 10, 0.0, Some(&filter))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
    }
}
