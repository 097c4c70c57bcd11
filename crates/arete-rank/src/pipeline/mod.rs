//! Thin convenience wrapper around [`arete_retrieve::orchestrator::RetrievalOrchestrator`].
//!
//! `Pipeline` adds nothing the orchestrator doesn't already do; it exists so
//! callers assembling a search stack from this facade get a builder-style
//! entry point instead of reaching for `RetrievalOrchestrator::new` and
//! `with_graph_service` directly.

use crate::prelude::*;
use std::sync::Arc;

pub struct Pipeline {
    orchestrator: RetrievalOrchestrator,
}

impl Pipeline {
    pub fn builder(vector_store: Arc<dyn VectorStore>) -> PipelineBuilder {
        PipelineBuilder::new(vector_store)
    }

    pub fn index_passage(&self, passage: &Passage) -> Result<(), RepositoryError> {
        self.orchestrator.index_passage(passage)
    }

    pub fn search(
        &self,
        method: RetrievalMethod,
        query: &str,
        query_embedding: Option<&[f32]>,
        vector_filter: Option<&VectorFilter>,
    ) -> Result<Vec<SearchResult>, RepositoryError> {
        self.orchestrator.search(method, query, query_embedding, vector_filter)
    }

    pub fn orchestrator(&self) -> &RetrievalOrchestrator {
        &self.orchestrator
    }
}

pub struct PipelineBuilder {
    vector_store: Arc<dyn VectorStore>,
    graph_service: Option<Arc<GraphTraversalService>>,
    hybrid_config: Option<HybridRetrievalConfig>,
}

impl PipelineBuilder {
    pub fn new(vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            vector_store,
            graph_service: None,
            hybrid_config: None,
        }
    }

    pub fn with_graph_service(mut self, service: Arc<GraphTraversalService>) -> Self {
        self.graph_service = Some(service);
        self
    }

    pub fn with_hybrid_config(mut self, config: HybridRetrievalConfig) -> Self {
        self.hybrid_config = Some(config);
        self
    }

    pub fn build(self) -> Pipeline {
        let mut orchestrator = RetrievalOrchestrator::new(self.vector_store);
        if let Some(service) = self.graph_service {
            orchestrator = orchestrator.with_graph_service(service);
        }
        if let Some(config) = self.hybrid_config {
            orchestrator.set_hybrid_config(config);
        }
        Pipeline { orchestrator }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_working_pipeline() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = Pipeline::builder(store).build();
        pipeline
            .index_passage(&Passage::new(1, 0, "virtue is a mean between extremes"))
            .unwrap();
        let results = pipeline.search(RetrievalMethod::Sparse, "virtue", None, None).unwrap();
        assert!(results.iter().any(|r| r.passage.id == 1));
    }
}
