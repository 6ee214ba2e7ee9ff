//! Configuration for the retrieval system.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::RetrievalErr;

/// Top-level retrieval configuration, mirroring the `rag_*` config keys
/// the core consumes (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Directories the DirectoryWatcher watches for changes.
    #[serde(default)]
    pub rag_watched_directories: HashSet<PathBuf>,

    /// Directory for storing manifest and vector store data.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalEngineConfig,

    #[serde(default = "default_embedder_model")]
    pub rag_embedder_model: String,

    /// Fraction of the prompt content budget given to RAG context vs
    /// conversation history.
    #[serde(default = "default_context_allocation_ratio")]
    pub context_allocation_ratio: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rag_watched_directories: HashSet::new(),
            data_dir: default_data_dir(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalEngineConfig::default(),
            rag_embedder_model: default_embedder_model(),
            context_allocation_ratio: default_context_allocation_ratio(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ataraxai")
        .join("rag")
}

fn default_embedder_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Default embedding dimensionality for `rag_embedder_model`.
pub fn default_embedding_dimension() -> i32 {
    1536
}

fn default_context_allocation_ratio() -> f64 {
    0.5
}

/// Chunker configuration (`rag_chunk_size`, `rag_chunk_overlap`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub rag_chunk_size: i32,

    #[serde(default = "default_chunk_overlap")]
    pub rag_chunk_overlap: i32,

    /// Ordered separator list, tried largest-unit-first. `None` uses the
    /// built-in default (paragraph, line, sentence, word, character).
    #[serde(default)]
    pub rag_separators: Option<Vec<String>>,

    #[serde(default = "default_keep_separator")]
    pub rag_keep_separator: bool,

    /// Tokenizer encoding name, used when no CompletionEngine tokenizer
    /// is supplied.
    #[serde(default = "default_tiktoken_model")]
    pub rag_model_name_for_tiktoken: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            rag_chunk_size: default_chunk_size(),
            rag_chunk_overlap: default_chunk_overlap(),
            rag_separators: None,
            rag_keep_separator: default_keep_separator(),
            rag_model_name_for_tiktoken: default_tiktoken_model(),
        }
    }
}

impl ChunkingConfig {
    /// Validate the hard invariant `overlap < size` (§4.2, §7 InputError).
    pub fn validate(&self) -> Result<()> {
        if self.rag_chunk_size <= 0 {
            return Err(RetrievalErr::ConfigError {
                field: "chunking.rag_chunk_size".to_string(),
                cause: format!("must be positive, got {}", self.rag_chunk_size),
            });
        }
        if self.rag_chunk_overlap < 0 {
            return Err(RetrievalErr::ConfigError {
                field: "chunking.rag_chunk_overlap".to_string(),
                cause: format!("must be non-negative, got {}", self.rag_chunk_overlap),
            });
        }
        if self.rag_chunk_overlap >= self.rag_chunk_size {
            return Err(RetrievalErr::ConfigError {
                field: "chunking.rag_chunk_overlap".to_string(),
                cause: format!(
                    "must be < rag_chunk_size ({}), got {}",
                    self.rag_chunk_size, self.rag_chunk_overlap
                ),
            });
        }
        Ok(())
    }
}

fn default_chunk_size() -> i32 {
    400
}
fn default_chunk_overlap() -> i32 {
    50
}
fn default_keep_separator() -> bool {
    true
}
fn default_tiktoken_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// RetrievalEngine configuration (`rag_use_hyde`, `rag_use_reranking`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalEngineConfig {
    #[serde(default = "default_use_hyde")]
    pub rag_use_hyde: bool,

    #[serde(default)]
    pub rag_use_reranking: bool,

    #[serde(default)]
    pub rag_cross_encoder_model: String,

    #[serde(default = "default_n_result")]
    pub rag_n_result: i32,

    #[serde(default = "default_n_result_final")]
    pub rag_n_result_final: i32,

    /// Bounded LRU capacity for HyDE memoization.
    #[serde(default = "default_hyde_cache_size")]
    pub hyde_cache_size: usize,
}

impl Default for RetrievalEngineConfig {
    fn default() -> Self {
        Self {
            rag_use_hyde: default_use_hyde(),
            rag_use_reranking: false,
            rag_cross_encoder_model: String::new(),
            rag_n_result: default_n_result(),
            rag_n_result_final: default_n_result_final(),
            hyde_cache_size: default_hyde_cache_size(),
        }
    }
}

fn default_use_hyde() -> bool {
    true
}
fn default_n_result() -> i32 {
    5
}
fn default_n_result_final() -> i32 {
    3
}
fn default_hyde_cache_size() -> usize {
    256
}

impl RetrievalConfig {
    /// Load configuration from config files.
    ///
    /// Search order (first found wins):
    /// 1. `{workdir}/.ataraxai/rag.toml` (project-level)
    /// 2. `~/.ataraxai/rag.toml` (global)
    /// 3. Default
    pub fn load(workdir: &std::path::Path) -> Result<Self> {
        let project_config = workdir.join(".ataraxai/rag.toml");
        if project_config.exists() {
            return Self::from_file(&project_config);
        }

        if let Some(home) = dirs::home_dir() {
            let global_config = home.join(".ataraxai/rag.toml");
            if global_config.exists() {
                return Self::from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RetrievalErr::ConfigParseError {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
    }

    /// Validate configuration consistency, returning soft warnings.
    /// Hard invariants (chunk overlap < size) are checked separately via
    /// `ChunkingConfig::validate` so construction can fail fast.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.data_dir.exists() {
            warnings.push(ConfigWarning::PathNotExists {
                field: "data_dir",
                path: self.data_dir.clone(),
            });
        }

        if self.chunking.validate().is_err() {
            warnings.push(ConfigWarning::InvalidValue {
                field: "chunking.rag_chunk_overlap",
                reason: "overlap must be < chunk size".to_string(),
            });
        }

        if self.retrieval.rag_n_result <= 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "retrieval.rag_n_result",
                reason: format!("must be > 0, got {}", self.retrieval.rag_n_result),
            });
        }
        if self.retrieval.rag_n_result_final <= 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "retrieval.rag_n_result_final",
                reason: format!("must be > 0, got {}", self.retrieval.rag_n_result_final),
            });
        }
        if self.retrieval.rag_use_reranking && self.retrieval.rag_cross_encoder_model.is_empty() {
            warnings.push(ConfigWarning::MissingDependency {
                feature: "rag_use_reranking",
                required: "rag_cross_encoder_model",
            });
        }
        if !(0.0..=1.0).contains(&self.context_allocation_ratio) {
            warnings.push(ConfigWarning::InvalidValue {
                field: "context_allocation_ratio",
                reason: format!(
                    "must be within [0.0, 1.0], got {}",
                    self.context_allocation_ratio
                ),
            });
        }

        warnings
    }
}

/// Configuration warning.
#[derive(Debug, Clone)]
pub enum ConfigWarning {
    MissingDependency {
        feature: &'static str,
        required: &'static str,
    },
    PathNotExists {
        field: &'static str,
        path: PathBuf,
    },
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingDependency { feature, required } => {
                write!(
                    f,
                    "Feature '{feature}' requires '{required}' to be configured"
                )
            }
            ConfigWarning::PathNotExists { field, path } => {
                write!(f, "Config '{field}' path does not exist: {path:?}")
            }
            ConfigWarning::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{field}': {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_sane_chunking() {
        let config = RetrievalConfig::default();
        assert_eq!(config.chunking.rag_chunk_size, 400);
        assert_eq!(config.chunking.rag_chunk_overlap, 50);
        assert!(config.chunking.validate().is_ok());
    }

    #[test]
    fn chunking_rejects_overlap_ge_size() {
        let mut chunking = ChunkingConfig::default();
        chunking.rag_chunk_overlap = chunking.rag_chunk_size;
        assert!(chunking.validate().is_err());
    }

    #[test]
    fn load_falls_back_to_default_when_no_files_present() {
        let dir = TempDir::new().unwrap();
        let config = RetrievalConfig::load(dir.path()).unwrap();
        assert_eq!(config, RetrievalConfig::default());
    }

    #[test]
    fn from_file_round_trips_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rag.toml");
        std::fs::write(
            &path,
            r#"
            rag_embedder_model = "custom-model"
            [chunking]
            rag_chunk_size = 800
            rag_chunk_overlap = 100
            "#,
        )
        .unwrap();
        let config = RetrievalConfig::from_file(&path).unwrap();
        assert_eq!(config.rag_embedder_model, "custom-model");
        assert_eq!(config.chunking.rag_chunk_size, 800);
    }

    #[test]
    fn validate_flags_missing_cross_encoder_model() {
        let mut config = RetrievalConfig::default();
        config.retrieval.rag_use_reranking = true;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::MissingDependency {
                feature: "rag_use_reranking",
                ..
            }
        )));
    }
}
