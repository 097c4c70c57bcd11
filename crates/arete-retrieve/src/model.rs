//! Core data model shared by every retrieval stage: [`Passage`], [`SearchResult`]
//! and its fusion/rerank/diversity extensions.
//!
//! Grounded on `dense_retrieval_service.py::SearchResult` (pydantic model) and
//! the `Fused`/`Reranked`/`Diversified` result shapes threaded through
//! `retrieval.py`, `reranking_service.py` and `diversity_service.py`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable passage identifier, unique within an index.
pub type PassageId = u32;
/// Identifier of the document a passage belongs to.
pub type DocumentId = u32;

/// Free-form side data carried alongside a result: provenance
/// (`retrieval_method`, per-strategy sub-scores, `graph_enhanced`, …).
pub type MetadataBag = HashMap<String, serde_json::Value>;

/// Coarse structural tag for a passage (paragraph, sentence, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassageKind {
    Paragraph,
    Sentence,
    Other(String),
}

/// The atomic retrieval unit: a chunk of text plus its side metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub document_id: DocumentId,
    pub text: String,
    /// Ordinal position of this passage within its owning document.
    pub position: u32,
    /// Byte offsets `[start, end)` of this passage within the document text.
    pub char_span: (usize, usize),
    pub word_count: u32,
    pub kind: Option<PassageKind>,
    /// Precomputed embedding vector of fixed dimension `D`. All passages in
    /// one index must share the same `D` — see [`crate::vector_store`].
    pub embedding: Option<Vec<f32>>,
    pub metadata: MetadataBag,
}

impl Passage {
    /// Build a passage, deriving `word_count` from `text` and leaving
    /// position/span/kind/embedding/metadata at their defaults.
    pub fn new(id: PassageId, document_id: DocumentId, text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count() as u32;
        Self {
            id,
            document_id,
            char_span: (0, text.len()),
            word_count,
            text,
            position: 0,
            kind: None,
            embedding: None,
            metadata: MetadataBag::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    pub fn with_kind(mut self, kind: PassageKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A grouping of passages. The core only consumes the id and a metadata bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub metadata: MetadataBag,
}

/// Which retrieval path produced a [`SearchResult`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalMethod {
    Dense,
    Sparse,
    Hybrid,
    Graph,
    GraphEnhancedHybrid,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Dense => "dense",
            RetrievalMethod::Sparse => "sparse",
            RetrievalMethod::Hybrid => "hybrid",
            RetrievalMethod::Graph => "graph",
            RetrievalMethod::GraphEnhancedHybrid => "graph_enhanced_hybrid",
        }
    }
}

/// A passage plus its relevance score, provenance, and ranking position.
///
/// `final_score()` is the enhanced score when present, else the base
/// `relevance_score` — every downstream stage reads scores through this
/// accessor rather than picking a field directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub passage: Passage,
    /// Base relevance score in `[0, 1]`.
    pub relevance_score: f32,
    pub query: String,
    /// Score after query-time enhancement (C5) or graph enrichment (C9), if any.
    pub enhanced_score: Option<f32>,
    /// 1-based position within the returned list.
    pub ranking_position: u32,
    pub metadata: MetadataBag,
}

impl SearchResult {
    pub fn new(passage: Passage, relevance_score: f32, query: impl Into<String>) -> Self {
        Self {
            passage,
            relevance_score,
            query: query.into(),
            enhanced_score: None,
            ranking_position: 0,
            metadata: MetadataBag::new(),
        }
    }

    pub fn final_score(&self) -> f32 {
        self.enhanced_score.unwrap_or(self.relevance_score)
    }

    pub fn tag(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

/// A [`SearchResult`] extended with the fusion strategy that produced it and
/// its pre-fusion rank on each side (when that side contributed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub result: SearchResult,
    pub fused_score: f32,
    pub dense_rank: Option<u32>,
    pub sparse_rank: Option<u32>,
    pub strategy: String,
}

/// A [`SearchResult`] extended with re-ranking provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedResult {
    pub original_result: SearchResult,
    pub rerank_score: f32,
    pub original_rank: u32,
    pub new_rank: u32,
    pub score_improvement: f32,
    pub reranking_method: String,
    pub metadata: MetadataBag,
}

/// A [`SearchResult`] extended with diversity-selection metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversifiedResult {
    pub original_result: SearchResult,
    pub diversity_score: f32,
    pub cluster_id: Option<u32>,
    pub cluster_center_distance: Option<f32>,
    pub uniqueness_score: f32,
    pub topical_diversity: f32,
    pub semantic_novelty: f32,
}

impl DiversifiedResult {
    /// Combine relevance and diversity under a named rule.
    ///
    /// `"relevance_only"` / `"diversity_only"` / `"balanced"` (default split
    /// `0.7` relevance / `0.3` diversity, matching the Python original).
    pub fn final_score(&self, rule: &str, relevance_weight: f32) -> f32 {
        let relevance = self.original_result.final_score();
        match rule {
            "relevance_only" => relevance,
            "diversity_only" => self.diversity_score,
            _ => relevance * relevance_weight + self.diversity_score * (1.0 - relevance_weight),
        }
    }
}
