//! Complete end-to-end retrieval pipeline example.
//!
//! Demonstrates the full hybrid pipeline over a handful of passages:
//! 1. index passages for sparse (BM25) and dense retrieval
//! 2. run sparse, dense, and fused hybrid search
//! 3. re-rank the fused results
//! 4. select a diverse subset from the re-ranked results

use arete_retrieve::prelude::*;
use std::sync::Arc;

fn main() -> Result<(), RepositoryError> {
    println!("=== Complete Retrieval Pipeline Example ===\n");

    let store = Arc::new(InMemoryVectorStore::new());
    let orchestrator = RetrievalOrchestrator::new(store);

    let corpus = [
        (1u32, "machine learning algorithms rely on neural networks", vec![0.9, 0.1, 0.0, 0.1]),
        (2, "information retrieval systems power modern search engines", vec![0.2, 0.9, 0.1, 0.0]),
        (3, "natural language processing uses transformer architectures", vec![0.8, 0.2, 0.1, 0.1]),
        (4, "deep learning extends neural networks with many layers", vec![0.85, 0.15, 0.05, 0.1]),
        (5, "vector databases support approximate nearest neighbor search", vec![0.1, 0.85, 0.2, 0.0]),
    ];

    for (id, text, embedding) in corpus {
        orchestrator.index_passage(&Passage::new(id, 0, text).with_embedding(embedding))?;
    }

    println!("Step 1: Sparse retrieval (BM25)");
    let sparse_results = orchestrator.search(RetrievalMethod::Sparse, "machine learning", None, None)?;
    println!("  Retrieved {} passages", sparse_results.len());

    println!("\nStep 2: Dense retrieval");
    let query_embedding = vec![0.88, 0.12, 0.05, 0.1];
    let dense_results = orchestrator.search(RetrievalMethod::Dense, "machine learning", Some(&query_embedding), None)?;
    println!("  Retrieved {} passages", dense_results.len());

    println!("\nStep 3: Hybrid fusion (weighted average of sparse + dense)");
    let fused = orchestrator.search(RetrievalMethod::Hybrid, "machine learning", Some(&query_embedding), None)?;
    for result in &fused {
        println!("  [{:.4}] {}", result.final_score(), result.passage.text);
    }

    println!("\nStep 4: Re-ranking fused candidates");
    let reranker = Reranker::new();
    let rerank_config = RerankingConfig {
        method: RerankingMethod::SemanticSimilarity,
        ..RerankingConfig::default()
    };
    let reranked = reranker.rerank("machine learning", &fused, Some(&query_embedding), &rerank_config)?;
    for result in &reranked {
        println!("  [{:.4}] {}", result.rerank_score, result.original_result.passage.text);
    }

    println!("\nStep 5: Diversity selection over re-ranked candidates");
    let candidates: Vec<SearchResult> = reranked.iter().map(|r| r.original_result.clone()).collect();
    let diversified = diversify(&candidates, &DiversityConfig::default())?;
    for result in &diversified {
        println!(
            "  [rel {:.4} / div {:.4}] {}",
            result.original_result.final_score(),
            result.diversity_score,
            result.original_result.passage.text
        );
    }

    println!("\nComplete.");
    Ok(())
}
