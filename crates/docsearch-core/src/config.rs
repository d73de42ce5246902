use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    /// The fully typed view of the merged configuration.
    pub fn settings(&self) -> Result<Settings> {
        self.figment.extract().map_err(|e| Error::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub timeouts: TimeoutSettings,
    pub paths: PathSettings,
    pub models: ModelSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.rerank_top_k == 0 {
            return Err(Error::Config("retrieval.rerank_top_k must be > 0".into()));
        }
        if r.citation_cap == 0 {
            return Err(Error::Config("retrieval.citation_cap must be > 0".into()));
        }
        if r.top_k_dense == 0 && r.top_k_lexical == 0 {
            return Err(Error::Config("at least one of top_k_dense/top_k_lexical must be > 0".into()));
        }
        if self.models.embedding_dim == 0 {
            return Err(Error::Config("models.embedding_dim must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_dense: usize,
    pub top_k_lexical: usize,
    pub rerank_top_k: usize,
    pub citation_cap: usize,
    pub rrf_k: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k_dense: 20, top_k_lexical: 20, rerank_top_k: 25, citation_cap: 5, rrf_k: 60 }
    }
}

/// Per suspension point budgets, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub lexical_ms: u64,
    pub embedding_ms: u64,
    pub dense_ms: u64,
    pub chunk_fetch_ms: u64,
    pub rerank_ms: u64,
    pub parent_fetch_ms: u64,
}

impl TimeoutSettings {
    pub fn lexical(&self) -> Duration { Duration::from_millis(self.lexical_ms) }
    pub fn embedding(&self) -> Duration { Duration::from_millis(self.embedding_ms) }
    pub fn dense(&self) -> Duration { Duration::from_millis(self.dense_ms) }
    pub fn chunk_fetch(&self) -> Duration { Duration::from_millis(self.chunk_fetch_ms) }
    pub fn rerank(&self) -> Duration { Duration::from_millis(self.rerank_ms) }
    pub fn parent_fetch(&self) -> Duration { Duration::from_millis(self.parent_fetch_ms) }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { lexical_ms: 2_000, embedding_ms: 5_000, dense_ms: 3_000, chunk_fetch_ms: 3_000, rerank_ms: 15_000, parent_fetch_ms: 3_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub lexical_index_dir: String,
    pub lancedb_dir: String,
    pub chunks_dir: String,
    pub table: String,
}

impl PathSettings {
    pub fn lexical_index_dir(&self) -> PathBuf { expand_path(&self.lexical_index_dir) }
    pub fn lancedb_dir(&self) -> PathBuf { expand_path(&self.lancedb_dir) }
    pub fn chunks_dir(&self) -> PathBuf { expand_path(&self.chunks_dir) }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            lexical_index_dir: "../dev_data/indexes/lexical".to_string(),
            lancedb_dir: "../dev_data/indexes/lancedb".to_string(),
            chunks_dir: "../dev_data/chunks".to_string(),
            table: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub embedding_dir: String,
    pub reranker_dir: String,
    pub embedding_dim: usize,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            embedding_dir: "../models/bge-m3".to_string(),
            reranker_dir: "../models/bge-reranker-base".to_string(),
            embedding_dim: 1024,
            max_len: 256,
            use_fake: false,
        }
    }
}

impl ModelSettings {
    pub fn embedding_dir(&self) -> PathBuf { expand_path(&self.embedding_dir) }
    pub fn reranker_dir(&self) -> PathBuf { expand_path(&self.reranker_dir) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
