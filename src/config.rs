//! Pipeline configuration
//!
//! Loaded from YAML; every field has a default, so an empty file (or no
//! file) is a valid configuration.

use crate::layout::LayoutConfig;
use crate::storage::{
    fingerprint, ArtifactCache, FileCache, MemoryCache, NoCache, OpenCache, SqliteCache,
    StorageResult,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Fragments sent to the extractor per run
    pub max_fragments: usize,
    /// Per-fragment limit on one extraction call
    pub timeout_seconds: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_fragments: 50,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name; also part of the embeddings cache key
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Strict lower bound for a similarity edge, in (0, 1)
    pub threshold: f64,
    /// Expected vector length; inferred from the first vector when unset
    pub dimension: Option<usize>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            dimension: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Files,
    Sqlite,
    Memory,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Directory (files) or database file (sqlite); a default location is used when unset
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    /// Open the configured backend. `default_dir` is used when `path` is unset.
    pub fn open(&self, default_dir: &Path) -> StorageResult<Box<dyn ArtifactCache>> {
        let cache: Box<dyn ArtifactCache> = match self.backend {
            CacheBackend::Files => Box::new(FileCache::open(
                self.path.clone().unwrap_or_else(|| default_dir.to_path_buf()),
            )?),
            CacheBackend::Sqlite => Box::new(SqliteCache::open(
                self.path
                    .clone()
                    .unwrap_or_else(|| default_dir.join("cache.db")),
            )?),
            CacheBackend::Memory => Box::new(MemoryCache::new()),
            CacheBackend::None => Box::new(NoCache),
        };
        Ok(cache)
    }
}

/// Full configuration for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub embedding: EmbeddingConfig,
    pub similarity: SimilarityConfig,
    pub layout: LayoutConfig,
    pub cache: CacheConfig,
}

/// Cache keys for the build stages, each chained on the one before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFingerprints {
    pub embeddings: String,
    pub graph: String,
    pub layout: String,
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        // serde_yaml reads an empty document as null, not as `{}`
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let t = self.similarity.threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "similarity.threshold must lie in (0, 1), got {}",
                t
            )));
        }
        if self.similarity.dimension == Some(0) {
            return Err(ConfigError::Invalid(
                "similarity.dimension must be positive".to_string(),
            ));
        }
        if self.extraction.max_fragments == 0 {
            return Err(ConfigError::Invalid(
                "extraction.max_fragments must be positive".to_string(),
            ));
        }
        if self.extraction.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "extraction.timeout_seconds must be positive".to_string(),
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model is empty".to_string()));
        }
        self.layout.validate().map_err(ConfigError::Invalid)
    }

    /// Fingerprint the build stages for an input identified by `input`.
    ///
    /// `embeddings` covers the embedding settings, `graph` adds the
    /// similarity settings, `layout` adds the layout settings.
    pub fn stage_fingerprints(&self, input: &str) -> StorageResult<StageFingerprints> {
        let embeddings = fingerprint(&self.embedding, Some(input))?;
        let graph = fingerprint(&self.similarity, Some(&embeddings))?;
        let layout = fingerprint(&self.layout, Some(&graph))?;
        Ok(StageFingerprints {
            embeddings,
            graph,
            layout,
        })
    }
}
