//! Replybank Configuration
//!
//! Handles parsing and management of replybank.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file name searched for from the working directory upward
pub const CONFIG_FILE_NAME: &str = "replybank.toml";

/// Environment variable overriding `storage.data_file`
pub const DATA_FILE_ENV: &str = "DATA_FILE";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching replybank.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplybankConfig {
    /// Engine cadence and randomness
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Nearest-history lookup
    #[serde(default)]
    pub similarity: SimilarityConfig,

    /// Intent classifier thresholds
    #[serde(default)]
    pub intent: IntentConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Snapshot location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Response bank override
    #[serde(default)]
    pub bank: BankConfig,
}

impl ReplybankConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: ReplybankConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                log::debug!("Using config {}", config_path.display());
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides (`DATA_FILE`).
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(DATA_FILE_ENV) {
            if !path.trim().is_empty() {
                self.storage.data_file = PathBuf::from(path);
            }
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.num_clusters == 0 {
            return Err(ConfigError::Invalid("engine.num_clusters must be at least 1".into()));
        }
        if self.engine.train_interval == 0 || self.engine.save_interval == 0 {
            return Err(ConfigError::Invalid(
                "engine.train_interval and engine.save_interval must be at least 1".into(),
            ));
        }
        if self.similarity.max_features == 0 {
            return Err(ConfigError::Invalid("similarity.max_features must be at least 1".into()));
        }
        for (name, value) in [
            ("similarity.threshold", self.similarity.threshold),
            ("intent.keyword_threshold", self.intent.keyword_threshold),
            ("intent.learned_threshold", self.intent.learned_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{} must be within 0..=1", name)));
            }
        }
        Ok(())
    }
}

/// Engine cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cluster count K; also the corpus size needed for similarity routing
    #[serde(default = "default_num_clusters")]
    pub num_clusters: usize,

    /// Re-cluster every N accepted queries
    #[serde(default = "default_train_interval")]
    pub train_interval: u64,

    /// Snapshot every N accepted queries
    #[serde(default = "default_save_interval")]
    pub save_interval: u64,

    /// Fixed RNG seed; entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_num_clusters() -> usize {
    5
}

fn default_train_interval() -> u64 {
    20
}

fn default_save_interval() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_clusters: default_num_clusters(),
            train_interval: default_train_interval(),
            save_interval: default_save_interval(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    10
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// Similarity index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Vocabulary cap
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    /// Minimum cosine similarity for a history match
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,
}

fn default_max_features() -> usize {
    100
}

fn default_similarity_threshold() -> f32 {
    0.70
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            threshold: default_similarity_threshold(),
        }
    }
}

/// Intent classifier thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default = "default_keyword_threshold")]
    pub keyword_threshold: f32,

    #[serde(default = "default_learned_threshold")]
    pub learned_threshold: f32,
}

fn default_keyword_threshold() -> f32 {
    0.70
}

fn default_learned_threshold() -> f32 {
    0.80
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            keyword_threshold: default_keyword_threshold(),
            learned_threshold: default_learned_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Skeleton/fragment draws before giving up on uniqueness
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_max_attempts() -> usize {
    8
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

/// Snapshot location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

fn default_data_file() -> PathBuf {
    std::env::temp_dir().join("training_data.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Response bank source; the built-in bank when `path` is unset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BankConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
