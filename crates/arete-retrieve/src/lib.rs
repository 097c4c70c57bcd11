//! Hybrid retrieval core for a Graph-RAG philosophical-text search system.
//!
//! This crate owns everything between "a query string" and "a ranked,
//! possibly graph-enriched list of passages": an inverted index and BM25
//! scorer (C1/C2), a SPLADE-inspired sparse-with-expansion scorer (C3), a
//! vector-store contract and dense retriever (C4/C5), four fusion strategies
//! (C6), a re-ranker with domain boosts and caching (C7), a diversity
//! selector (C8), knowledge-graph traversal and enrichment (C9), and an
//! orchestrator tying all of the above behind one `search` call (C10).
//!
//! # Pipeline shape
//!
//! A typical hybrid query flows as:
//! - sparse-with-expansion and dense retrieval each produce a ranked pool
//! - [`fusion::fuse`] merges the two pools into one ranking
//! - [`rerank::Reranker`] optionally re-scores the merged top candidates
//! - [`diversity::diversify`] optionally trims near-duplicates from the result
//! - [`graph::GraphTraversalService`] optionally blends in graph-derived context
//!
//! [`orchestrator::RetrievalOrchestrator`] drives this end to end; the
//! individual modules remain usable on their own for callers who want to
//! compose the pipeline differently.
//!
//! # Configuration
//!
//! [`config::RetrievalConfig`] aggregates every component's configuration and
//! can be loaded from defaults, a file, or environment variables (§6).

pub mod bm25;
pub mod config;
pub mod dense;
pub mod diversity;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod index;
pub mod model;
pub mod orchestrator;
pub mod rerank;
pub mod simd;
pub mod sparse_expansion;
pub mod tokenize;
pub mod vector_store;

pub use error::RepositoryError;

/// Re-exports of the primary types for `use arete_retrieve::prelude::*;`.
pub mod prelude {
    pub use crate::bm25::{Bm25Params, Bm25Scorer, ScoreFilter};
    pub use crate::config::RetrievalConfig;
    pub use crate::dense::{DenseRetriever, DenseSearchOptions};
    pub use crate::diversity::{diversify, DiversityConfig, DiversityMethod};
    pub use crate::error::RepositoryError;
    pub use crate::fusion::{fuse, FusionConfig, FusionStrategy};
    pub use crate::graph::{
        CypherQueryGenerator, EntityDetector, GraphStore, GraphTraversalConfig, GraphTraversalService,
    };
    pub use crate::index::InvertedIndex;
    pub use crate::model::{
        DiversifiedResult, Document, FusedResult, MetadataBag, Passage, PassageId, PassageKind,
        RerankedResult, RetrievalMethod, SearchResult,
    };
    pub use crate::orchestrator::{HybridRetrievalConfig, RetrievalOrchestrator};
    pub use crate::rerank::{CompositionRule, Reranker, RerankingConfig, RerankingMethod};
    pub use crate::sparse_expansion::{SparseExpansionParams, SparseExpansionScorer};
    pub use crate::vector_store::{InMemoryVectorStore, VectorFilter, VectorStore};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn end_to_end_sparse_then_dense_then_fuse() {
        let mut index = InvertedIndex::new();
        let store = Arc::new(InMemoryVectorStore::new());
        let mut passages = std::collections::HashMap::new();

        for (id, text, embedding) in [
            (1u32, "virtue is the mean between two extremes", vec![1.0, 0.0, 0.0]),
            (2, "justice concerns fairness within the city", vec![0.0, 1.0, 0.0]),
            (3, "the weather today is unusually mild", vec![0.0, 0.0, 1.0]),
        ] {
            let passage = Passage::new(id, 0, text).with_embedding(embedding);
            index.add(&passage).unwrap();
            store.insert(&passage).unwrap();
            passages.insert(id, passage);
        }

        let bm25 = Bm25Scorer::new(Bm25Params::default());
        let sparse_results = bm25.search(&index, &passages, "virtue", 10, 0.0, None);
        assert!(sparse_results.iter().any(|r| r.passage.id == 1));

        let dense = DenseRetriever::new(store);
        let dense_results = dense
            .search_by_vector(&[1.0, 0.0, 0.0], "virtue", DenseSearchOptions::default(), None)
            .unwrap();
        assert!(dense_results.iter().any(|r| r.passage.id == 1));

        let fused = fuse(&dense_results, &sparse_results, &FusionConfig::default(), 10, 0.0).unwrap();
        assert!(!fused.is_empty());
        assert_eq!(fused[0].result.passage.id, 1);
    }
}
