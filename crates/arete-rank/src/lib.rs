//! # arete-rank
//!
//! Facade and CLI entry point for the `arete-retrieve` hybrid retrieval core.
//!
//! This crate re-exports [`arete_retrieve`] under one name and ships the
//! `arete-rank` CLI binary (behind the `cli` feature) so downstream
//! consumers and operators have a single crate to depend on rather than
//! reaching into the retrieval core's module layout directly. All of the
//! actual retrieval logic — BM25, sparse expansion, dense retrieval,
//! fusion, re-ranking, diversity, graph traversal, and the orchestrator
//! that ties them together — lives in `arete-retrieve`.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use arete_rank::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryVectorStore::new());
//! let orchestrator = RetrievalOrchestrator::new(store);
//! orchestrator.index_passage(&Passage::new(1, 0, "virtue is a mean between extremes")).unwrap();
//! let results = orchestrator.search(RetrievalMethod::Sparse, "virtue", None, None).unwrap();
//! ```

pub mod pipeline;

pub use arete_retrieve::*;

/// Re-export of [`arete_retrieve::prelude`] for `use arete_rank::prelude::*;`.
pub mod prelude {
    pub use arete_retrieve::prelude::*;
    pub use crate::pipeline::Pipeline;
}
