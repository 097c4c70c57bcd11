//! `arete-rank` CLI: index a plain-text corpus and run one search against it.
//!
//! This is a thin demonstration harness over [`arete_rank::Pipeline`], not a
//! production indexing tool — passages are read one-per-line from a file and
//! indexed for sparse retrieval only (no embeddings, so `dense`/`hybrid`
//! methods are unavailable from this binary).

use anyhow::{Context, Result};
use arete_rank::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "Hybrid retrieval CLI over arete-retrieve", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a text corpus (one passage per line) and run a search query.
    Search {
        /// Path to a newline-delimited passage corpus.
        #[arg(long)]
        corpus: PathBuf,
        /// Query text.
        query: String,
        /// Retrieval method to use.
        #[arg(long, value_enum, default_value_t = Method::Sparse)]
        method: Method,
        /// Maximum number of results to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum Method {
    Sparse,
    Graph,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Search { corpus, query, method, limit } => run_search(&corpus, &query, method, limit),
    }
}

fn run_search(corpus: &PathBuf, query: &str, method: Method, limit: usize) -> Result<()> {
    let text = fs::read_to_string(corpus).with_context(|| format!("reading corpus file {corpus:?}"))?;

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = Pipeline::builder(store).build();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        pipeline
            .index_passage(&Passage::new(idx as u32 + 1, 0, line))
            .with_context(|| format!("indexing line {idx}"))?;
    }

    let mut hybrid_config = pipeline.orchestrator().hybrid_config();
    hybrid_config.limit = limit;
    pipeline.orchestrator().set_hybrid_config(hybrid_config);

    let results = match method {
        Method::Sparse => pipeline.search(RetrievalMethod::Sparse, query, None, None)?,
        Method::Graph => pipeline.search(RetrievalMethod::Graph, query, None, None)?,
    };

    if results.is_empty() {
        println!("no matches for {query:?}");
        return Ok(());
    }

    for (rank, result) in results.iter().take(limit).enumerate() {
        println!("{:>3}. [{:.4}] {}", rank + 1, result.final_score(), result.passage.text);
    }
    Ok(())
}
