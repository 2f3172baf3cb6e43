//! Configuration parsing and validation (spec §6).
//!
//! Config is a TOML document with one struct per concern and
//! `serde(default)` for optional fields, post-parse-validated by
//! [`load_config`] — the same shape as the teacher's `config::load_config`,
//! narrowed to this crate's key set (`vectorDB.*`, `embedding.*`,
//! `indexing.*`, `search.*`, `customAdapters`) plus the four environment
//! variable overrides from §6. Loading a config file is a collaborator
//! concern per spec's Non-goals, so this module stops at a single
//! documented `load_config(path)` entry point — it does not implement
//! search-path discovery.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, rename = "vectorDB")]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub custom_adapters: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorDbConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub options: VectorDbOptions,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self { provider: default_provider(), options: VectorDbOptions::default() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorDbOptions {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for VectorDbOptions {
    fn default() -> Self {
        Self { path: default_path(), dimension: default_dimension() }
    }
}

fn default_provider() -> String {
    "sqlite".to_string()
}
fn default_path() -> String {
    "./ragcore.db".to_string()
}
fn default_dimension() -> usize {
    768
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { model: None, dimension: default_dimension() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IndexingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub preserve_boundaries: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            preserve_boundaries: false,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_true")]
    pub enable_rerank: bool,
    #[serde(default = "default_rerank_boost")]
    pub rerank_boost_factor: f64,
    #[serde(default = "default_hybrid_weight")]
    pub hybrid_keyword_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            enable_rerank: true,
            rerank_boost_factor: default_rerank_boost(),
            hybrid_keyword_weight: default_hybrid_weight(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_rerank_boost() -> f64 {
    0.1
}
fn default_hybrid_weight() -> f64 {
    0.3
}

/// Reads and validates a config file at `path`. Environment variable
/// overrides (`VECTOR_DB_PROVIDER`, `VECTOR_DB_CONFIG`, `SQLITE_DB_PATH`,
/// `EMBEDDING_DIMENSION`) are applied afterward via [`apply_env_overrides`].
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config: Config = toml::from_str(&content).with_context(|| "failed to parse config file")?;
    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Applies the four environment variable overrides named in spec §6.
/// `VECTOR_DB_CONFIG` is a JSON object deep-merged into `vectorDB.options`.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(provider) = std::env::var("VECTOR_DB_PROVIDER") {
        config.vector_db.provider = provider;
    }
    if let Ok(raw) = std::env::var("VECTOR_DB_CONFIG") {
        let extra: serde_json::Value =
            serde_json::from_str(&raw).with_context(|| "VECTOR_DB_CONFIG is not valid JSON")?;
        if let Some(path) = extra.get("path").and_then(|v| v.as_str()) {
            config.vector_db.options.path = path.to_string();
        }
        if let Some(dim) = extra.get("dimension").and_then(|v| v.as_u64()) {
            config.vector_db.options.dimension = dim as usize;
        }
    }
    if let Ok(path) = std::env::var("SQLITE_DB_PATH") {
        config.vector_db.options.path = path;
    }
    if let Ok(dim) = std::env::var("EMBEDDING_DIMENSION") {
        let dim: usize = dim.parse().with_context(|| "EMBEDDING_DIMENSION is not a valid integer")?;
        config.embedding.dimension = dim;
        config.vector_db.options.dimension = dim;
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    if config.vector_db.options.dimension == 0 {
        anyhow::bail!("vectorDB.options.dimension must be > 0");
    }
    if config.embedding.dimension != config.vector_db.options.dimension {
        anyhow::bail!(
            "embedding.dimension ({}) must match vectorDB.options.dimension ({})",
            config.embedding.dimension,
            config.vector_db.options.dimension
        );
    }
    if config.indexing.chunk_overlap >= config.indexing.chunk_size {
        anyhow::bail!(
            "indexing.chunkOverlap ({}) must be less than indexing.chunkSize ({})",
            config.indexing.chunk_overlap,
            config.indexing.chunk_size
        );
    }
    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batchSize must be > 0");
    }
    if !(0.0..=1.0).contains(&config.search.hybrid_keyword_weight) {
        anyhow::bail!("search.hybridKeywordWeight must be in [0.0, 1.0]");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_apply_when_sections_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "");
        let config = load_config(&path).unwrap();
        assert_eq!(config.vector_db.provider, "sqlite");
        assert_eq!(config.vector_db.options.dimension, 768);
        assert_eq!(config.search.default_k, 5);
        assert!(config.custom_adapters.is_empty());
    }

    #[test]
    fn mismatched_embedding_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[embedding]\ndimension = 384\n[vectorDB.options]\ndimension = 768\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[indexing]\nchunkSize = 100\nchunkOverlap = 100\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn custom_adapters_table_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[customAdapters]\nmyvec = \"./plugins/myvec.so\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.custom_adapters.get("myvec").map(String::as_str), Some("./plugins/myvec.so"));
    }
}
