//! Layered configuration for the retrieval core (§6).
//!
//! Grounded on `config.py`'s pydantic `Settings`: a typed aggregate with
//! built-in defaults, overridable by a config file and then by environment
//! variables. Reimplemented with the `config` crate's layered-source builder
//! rather than pydantic's `BaseSettings`.

use crate::bm25::Bm25Params;
use crate::dense::DenseSearchOptions;
use crate::diversity::DiversityConfig;
use crate::fusion::FusionConfig;
use crate::graph::GraphTraversalConfig;
use crate::rerank::RerankingConfig;
use crate::sparse_expansion::SparseExpansionParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Aggregate configuration for every retrieval component, assembled from
/// defaults, an optional file, and environment overrides prefixed `ARETE_`
/// (e.g. `ARETE_FUSION__FUSION_K=100`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    pub bm25: Bm25Params,
    pub sparse_expansion: SparseExpansionParams,
    pub dense: DenseSearchOptions,
    pub fusion: FusionConfig,
    pub reranking: RerankingConfig,
    pub diversity: DiversityConfig,
    pub graph: GraphTraversalConfig,
    pub log_level: String,
    pub debug: bool,
    pub max_retrievals: usize,
    pub similarity_threshold: f32,
    pub batch_size: usize,
    pub max_workers: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            sparse_expansion: SparseExpansionParams::default(),
            dense: DenseSearchOptions::default(),
            fusion: FusionConfig::default(),
            reranking: RerankingConfig::default(),
            diversity: DiversityConfig::default(),
            graph: GraphTraversalConfig::default(),
            log_level: "info".to_string(),
            debug: false,
            max_retrievals: 100,
            similarity_threshold: 0.7,
            batch_size: 32,
            max_workers: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl RetrievalConfig {
    /// Load defaults, then layer in `path` (TOML/YAML/JSON inferred from
    /// extension) if it exists, then `ARETE_`-prefixed environment
    /// variables. Mirrors `get_settings()`'s env-file-then-env-var layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("ARETE").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load defaults overridden purely by `ARETE_`-prefixed environment
    /// variables, with no config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::Environment::with_prefix("ARETE").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = RetrievalConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(config.fusion.validate().is_ok());
        assert!(config.reranking.validate().is_ok());
        assert_eq!(config.diversity.similarity_threshold, 0.85);
        assert_eq!(config.graph.max_path_length, 3);
        assert_eq!(config.graph.timeout_seconds, 30);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let config = RetrievalConfig::from_env().expect("env-only load should not fail");
        assert_eq!(config, RetrievalConfig::default());
    }

    #[test]
    fn from_file_falls_back_to_defaults_when_missing() {
        let config = RetrievalConfig::from_file("/nonexistent/arete.toml").expect("missing file is tolerated");
        assert_eq!(config, RetrievalConfig::default());
    }
}
