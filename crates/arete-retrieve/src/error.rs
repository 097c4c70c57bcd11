//! Error taxonomy for `arete-retrieve`.
//!
//! Each subsystem (§7 of the design doc) owns its own error enum. The
//! top-level [`RepositoryError`] wraps all of them and is the only error type
//! the orchestrator's public `search` surface returns.

use thiserror::Error;

/// Empty/invalid query input, or invalid caller-supplied parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryProcessingError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("query embedding has dimension {query_dim}, index expects {doc_dim}")]
    DimensionMismatch { query_dim: usize, doc_dim: usize },
}

/// Index invariant violations or store-side write failures during mutation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexingError {
    #[error("index invariant violated: {0}")]
    InvariantViolated(String),
    #[error("embedding dimension mismatch: index expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Sub-retriever (dense or sparse) failure, reported with cause.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetrievalError {
    #[error(transparent)]
    QueryProcessing(#[from] QueryProcessingError),
    #[error("sub-retriever failed: {0}")]
    SubRetrieverFailed(String),
}

/// Fusion-stage failures: unknown strategy, or inconsistent inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FusionError {
    #[error("unknown fusion strategy: {0}")]
    UnknownStrategy(String),
    #[error("duplicate passage id {0} within a single input list")]
    DuplicateId(u32),
    #[error(
        "dense_weight + sparse_weight must equal 1.0 within 1e-3 (got {dense_weight} + {sparse_weight})"
    )]
    InvalidWeights { dense_weight: f32, sparse_weight: f32 },
}

/// Re-ranking failures: scorer invocation failure, embedding service
/// unavailable, or invalid configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RerankingError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("cross-encoder scorer failed: {0}")]
    ScorerFailed(String),
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("original_weight + rerank_weight must equal 1.0 (got {0} + {1})")]
    InvalidWeights(f32, f32),
    #[error("unknown combination method: {0}")]
    UnknownCombinationMethod(String),
}

/// Diversity-selection failures. An empty candidate set is not an error (it
/// returns an empty result) — only an unrecognized method is.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiversityError {
    #[error("unknown diversity method: {0}")]
    UnknownMethod(String),
}

/// Graph-store unreachable, query above the complexity cap with no
/// applicable fallback shape, or a timed-out traversal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphTraversalError {
    #[error("graph store unreachable: {0}")]
    StoreUnreachable(String),
    #[error("query complexity {complexity} exceeds cap {cap} and no fallback shape applies")]
    ComplexityExceeded { complexity: u8, cap: u8 },
    #[error("graph query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Top-level error surfaced to callers of the orchestrator's `search`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    QueryProcessing(#[from] QueryProcessingError),
    #[error(transparent)]
    Indexing(#[from] IndexingError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Fusion(#[from] FusionError),
    #[error(transparent)]
    Reranking(#[from] RerankingError),
    #[error(transparent)]
    Diversity(#[from] DiversityError),
    #[error(transparent)]
    GraphTraversal(#[from] GraphTraversalError),
    #[error("{subsystem}: {message}")]
    Other {
        subsystem: &'static str,
        message: String,
    },
}
