use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::output::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8080";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

const APP_DIR: &str = "docqa";
const PROJECT_DIR: &str = ".docqa";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// A configuration merged from every layer, with the files that contributed.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub config: Config,
    pub global_path: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
}

impl Config {
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Directory a new project config is created in (the current directory).
    pub fn project_config_dir() -> Option<PathBuf> {
        std::env::current_dir().ok().map(|d| d.join(PROJECT_DIR))
    }

    /// Nearest `.docqa/config.toml` in the current directory or an ancestor.
    pub fn find_project_config() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        find_project_config_from(&cwd)
    }

    pub fn models_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join(APP_DIR).join("models"))
    }

    /// Load defaults, the global file, the project file and environment overrides, in that order.
    pub fn load() -> Result<ResolvedConfig, ConfigError> {
        let global_path = Self::global_path().filter(|p| p.exists());
        let project_path = Self::find_project_config();

        let mut merged = toml::Table::new();
        for path in [&global_path, &project_path].into_iter().flatten() {
            let content = std::fs::read_to_string(path)?;
            let layer: toml::Table = toml::from_str(&content)?;
            merge_tables(&mut merged, layer);
        }

        let mut config: Config = toml::Value::Table(merged).try_into()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(ResolvedConfig {
            config,
            global_path,
            project_path,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn init_global() -> Result<PathBuf, ConfigError> {
        let path = Self::global_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        Self::default().save_to(&path)?;
        Ok(path)
    }

    pub fn init_project() -> Result<PathBuf, ConfigError> {
        let dir = Self::project_config_dir().ok_or_else(|| {
            ConfigError::PathError("could not determine current directory".to_string())
        })?;
        let path = dir.join(CONFIG_FILE);
        Self::default().save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `DOCQA_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DOCQA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("DOCQA_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("DOCQA_LLM_TIMEOUT_SECS") {
            let secs = v.parse::<u64>().map_err(|_| {
                ConfigError::ValidationError(format!("DOCQA_LLM_TIMEOUT_SECS is not a number: {v}"))
            })?;
            self.llm.timeout_secs = Some(secs);
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_BACKEND") {
            self.embedding.backend = v.parse().map_err(ConfigError::ValidationError)?;
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_URL") {
            self.embedding.url = v;
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_MODEL_PATH") {
            self.embedding.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DOCQA_TOP_K") {
            self.retrieval.top_k = v.parse::<u32>().map_err(|_| {
                ConfigError::ValidationError(format!("DOCQA_TOP_K is not a number: {v}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.chunking.chunk_size == 0 {
            return invalid("chunking.chunk_size must be greater than 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be greater than 0");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be greater than 0");
        }
        if self.retrieval.top_k == 0 || self.retrieval.summary_top_k == 0 {
            return invalid("retrieval.top_k and retrieval.summary_top_k must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return invalid("llm.temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }

    /// Directory holding `model.onnx` and `tokenizer.json` for the configured model.
    pub fn embedding_model_dir(&self) -> Option<PathBuf> {
        self.embedding.model_path.clone().or_else(|| {
            Self::models_dir().map(|d| d.join(model_dir_name(&self.embedding.model_id)))
        })
    }
}

fn find_project_config_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|p| p.is_file())
}

/// Recursively merge `overlay` into `base`; scalar values in `overlay` win.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

pub fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// In-process ONNX Runtime model
    #[default]
    Onnx,
    /// Remote text-embeddings server
    Http,
}

impl std::str::FromStr for EmbeddingBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(EmbeddingBackendKind::Onnx),
            "http" => Ok(EmbeddingBackendKind::Http),
            _ => Err(format!("unknown embedding backend: {s}")),
        }
    }
}

impl std::fmt::Display for EmbeddingBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingBackendKind::Onnx => write!(f, "onnx"),
            EmbeddingBackendKind::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackendKind,

    #[serde(default = "default_embedding_model")]
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_batch_size() -> u32 {
    32
}

fn default_max_tokens() -> u32 {
    256
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::default(),
            model_id: default_embedding_model(),
            model_path: None,
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            max_tokens: default_max_tokens(),
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_chunk_size() -> u32 {
    1000
}

fn default_chunk_overlap() -> u32 {
    200
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Similarity metric used by the vector index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::L2 => write!(f, "l2"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_summary_top_k")]
    pub summary_top_k: u32,

    #[serde(default)]
    pub metric: Metric,
}

fn default_top_k() -> u32 {
    3
}

fn default_summary_top_k() -> u32 {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            summary_top_k: default_summary_top_k(),
            metric: Metric::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout; unset means wait indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_llm_base_url() -> String {
    DEFAULT_LLM_BASE_URL.to_string()
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OutputConfig {
    #[serde(default)]
    pub default_format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.model_id, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.summary_top_k, 5);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(config.llm.timeout_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [chunking]
            chunk_size = 500

            [retrieval]
            metric = "l2"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.metric, Metric::L2);
        assert_eq!(config.llm.temperature, 0.7);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let result = Config::from_toml_str(
            r#"
            [chunking]
            chunk_size = 100
            chunk_overlap = 100
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_temperature_range() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCQA_LLM_MODEL", "mixtral"),
            ("DOCQA_LLM_TIMEOUT_SECS", "30"),
            ("DOCQA_EMBEDDING_BACKEND", "http"),
            ("DOCQA_TOP_K", "7"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.model, "mixtral");
        assert_eq!(config.llm.timeout_secs, Some(30));
        assert_eq!(config.embedding.backend, EmbeddingBackendKind::Http);
        assert_eq!(config.retrieval.top_k, 7);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let result = config.apply_env(|k| (k == "DOCQA_TOP_K").then(|| "many".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_tables_deep() {
        let mut base: toml::Table = toml::from_str(
            r#"
            [llm]
            model = "a"
            temperature = 0.2
            "#,
        )
        .unwrap();
        let overlay: toml::Table = toml::from_str(
            r#"
            [llm]
            model = "b"
            "#,
        )
        .unwrap();
        merge_tables(&mut base, overlay);

        let config: Config = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.llm.model, "b");
        assert_eq!(config.llm.temperature, 0.2);
    }

    #[test]
    fn test_find_project_config_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(PROJECT_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE), "").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_project_config_from(&nested).unwrap();
        assert_eq!(found, config_dir.join(CONFIG_FILE));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = Config::default();
        config.llm.timeout_secs = Some(45);
        config.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let reloaded = Config::from_toml_str(&content).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_model_dir_name() {
        assert_eq!(
            model_dir_name("sentence-transformers/all-MiniLM-L6-v2"),
            "sentence-transformers--all-MiniLM-L6-v2"
        );
    }
}
