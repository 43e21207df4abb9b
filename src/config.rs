//! Process configuration: built-in defaults, a JSON file under the data
//! directory, and environment variable overrides, in that precedence order.
//!
//! Loaded lazily and cached for the lifetime of the process; `clear_cache`
//! forces the next `load` to re-read the file and environment.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{PalaceError, Result};

const CONFIG_FILE_NAME: &str = "config.json";

/// `nomic-embed-text` first: fits pgvector's HNSW dimension ceiling and runs
/// well on CPU. Order matters — first available wins.
pub const PREFERRED_EMBEDDING_MODELS: &[&str] = &["nomic-embed-text", "mxbai-embed-large"];

pub const PREFERRED_LLM_MODELS: &[&str] = &[
    "qwen3:14b",
    "qwen3:8b",
    "qwen3:4b",
    "llama3.2",
    "llama3.1",
    "mistral",
];

/// Small, CPU-friendly models preferred for edge classification, which only
/// needs to return one word from a constrained vocabulary.
pub const PREFERRED_CLASSIFICATION_MODELS: &[&str] = &[
    "qwen3:1.7b",
    "qwen3:0.6b",
    "gemma3:1b",
    "llama3.2:1b",
    "phi3:mini",
];

/// Known embedding model -> dimension, used when `embedding_dimension` is
/// not explicitly set and the model name is known. pgvector before 0.7
/// caps HNSW/IVFFlat indexes at 2000 dimensions, which is why
/// `nomic-embed-text` (768d) is the default recommendation over
/// sfr-embedding-mistral (4096d).
pub fn model_dimension(model: &str) -> Option<usize> {
    let table: &[(&str, usize)] = &[
        ("nomic-embed-text", 768),
        ("mxbai-embed-large", 1024),
        ("sfr-embedding-mistral", 4096),
        ("avr/sfr-embedding-mistral:f16", 4096),
        ("sfr-embedding-mistral:f16", 4096),
    ];
    table
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, dim)| *dim)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `"postgres"` or `"sqlite"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: "postgres".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub enabled: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoLinkConfig {
    pub enabled: bool,
    pub similarity_threshold: f32,
    pub suggest_threshold: f32,
    pub max_links: usize,
    pub max_suggestions: usize,
    pub same_project_only: bool,
    pub classify_edges: bool,
    pub classification_model: Option<String>,
}

impl Default for AutoLinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // spec.md §9 flags 0.65 vs 0.75 as ambiguous; DESIGN.md records
            // 0.75 as canonical (it is the only value ever observed on disk,
            // in config_v2.py's DEFAULT_CONFIG).
            similarity_threshold: 0.75,
            suggest_threshold: 0.50,
            max_links: 5,
            max_suggestions: 5,
            same_project_only: true,
            classify_edges: true,
            classification_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ollama_url: String,
    pub embedding_model: Option<String>,
    pub embedding_dimension: Option<usize>,
    pub llm_model: Option<String>,
    pub synthesis: SynthesisConfig,
    pub auto_link: AutoLinkConfig,
    pub instances: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            ollama_url: "http://localhost:11434".to_string(),
            embedding_model: None,
            embedding_dimension: Some(768),
            llm_model: None,
            synthesis: SynthesisConfig::default(),
            auto_link: AutoLinkConfig::default(),
            instances: vec!["default".to_string()],
        }
    }
}

impl Config {
    pub fn is_postgres(&self) -> bool {
        self.database.kind == "postgres"
    }

    pub fn embedding_dimension(&self) -> usize {
        if let Some(dim) = self.embedding_dimension {
            return dim;
        }
        if let Some(model) = &self.embedding_model {
            if let Some(dim) = model_dimension(model) {
                return dim;
            }
        }
        4096
    }

    pub fn database_url(&self, data_dir: &std::path::Path) -> String {
        if let Some(url) = &self.database.url {
            return url.clone();
        }
        if self.is_postgres() {
            "postgresql://localhost:5432/memory_palace".to_string()
        } else {
            format!("sqlite://{}/memories.db", data_dir.display())
        }
    }
}

static CONFIG_CACHE: Lazy<RwLock<Option<Config>>> = Lazy::new(|| RwLock::new(None));

pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MEMORY_PALACE_DATA_DIR") {
        return PathBuf::from(shellexpand::tilde(&dir).into_owned());
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memory-palace")
}

fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}

/// Recursively merge `override_val` into `base`, replacing scalars/arrays
/// and merging nested objects key-by-key so a partial `config.json` only
/// touches the keys it sets.
fn deep_merge(base: &mut serde_json::Value, override_val: serde_json::Value) {
    match (base, override_val) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(override_map)) => {
            for (k, v) in override_map {
                deep_merge(base_map.entry(k).or_insert(serde_json::Value::Null), v);
            }
        }
        (base_slot, override_val) => {
            *base_slot = override_val;
        }
    }
}

/// Load configuration, applying file and environment overrides on top of
/// defaults. Cached after the first call; see `clear_cache`.
pub fn load() -> Result<Config> {
    if let Some(cached) = CONFIG_CACHE.read().clone() {
        return Ok(cached);
    }

    let mut value = serde_json::to_value(Config::default())?;

    let path = config_path();
    if path.exists() {
        let text = std::fs::read_to_string(&path)?;
        let file_value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| PalaceError::Config(format!("invalid config file {:?}: {e}", path)))?;
        deep_merge(&mut value, file_value);
    }

    let mut config: Config = serde_json::from_value(value)?;

    if let Ok(url) = std::env::var("MEMORY_PALACE_DATABASE_URL") {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            config.database.kind = "postgres".to_string();
        } else if url.starts_with("sqlite://") {
            config.database.kind = "sqlite".to_string();
        }
        config.database.url = Some(url);
    }
    if let Ok(url) = std::env::var("OLLAMA_HOST") {
        config.ollama_url = url;
    }
    if let Ok(model) = std::env::var("MEMORY_PALACE_EMBEDDING_MODEL") {
        config.embedding_model = Some(model);
    }
    if let Ok(model) = std::env::var("MEMORY_PALACE_LLM_MODEL") {
        config.llm_model = Some(model);
    }
    if let Ok(instance) = std::env::var("MEMORY_PALACE_INSTANCE_ID") {
        if !config.instances.contains(&instance) {
            config.instances.push(instance);
        }
    }

    *CONFIG_CACHE.write() = Some(config.clone());
    Ok(config)
}

/// Force the next `load` call to re-read the file and environment.
pub fn clear_cache() {
    *CONFIG_CACHE.write() = None;
}

/// Persist `config` to `<data_dir>/config.json` and refresh the cache.
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, text)?;
    *CONFIG_CACHE.write() = Some(config.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.database.kind, "postgres");
        assert_eq!(config.auto_link.similarity_threshold, 0.75);
        assert_eq!(config.auto_link.suggest_threshold, 0.50);
        assert!(config.synthesis.enabled);
    }

    #[test]
    fn deep_merge_only_touches_named_keys() {
        let mut base = serde_json::to_value(Config::default()).unwrap();
        let override_val = serde_json::json!({ "auto_link": { "max_links": 2 } });
        deep_merge(&mut base, override_val);
        let merged: Config = serde_json::from_value(base).unwrap();
        assert_eq!(merged.auto_link.max_links, 2);
        assert!(merged.auto_link.enabled);
        assert_eq!(merged.auto_link.similarity_threshold, 0.75);
    }

    #[test]
    fn embedding_dimension_falls_back_to_model_table() {
        let mut config = Config::default();
        config.embedding_dimension = None;
        config.embedding_model = Some("mxbai-embed-large".to_string());
        assert_eq!(config.embedding_dimension(), 1024);
    }
}
