//! Training Data Store
//!
//! Best-effort JSON snapshot of everything the engine learns: the query
//! corpus and its labels, synthesized templates, persistent used-response
//! sets, learned phrases and per-query intents.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access training data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode training data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    #[serde(default)]
    pub queries: Vec<String>,

    #[serde(default)]
    pub cluster_labels: Vec<i32>,

    /// Synthesized templates per scope key
    #[serde(default)]
    pub generated_responses: BTreeMap<String, Vec<String>>,

    /// Rendered responses ever shown, per scope key
    #[serde(default)]
    pub used_responses: BTreeMap<String, BTreeSet<String>>,

    /// Normalized query -> intent
    #[serde(default)]
    pub learned_phrases: BTreeMap<String, String>,

    /// Lower-cased query -> intent
    #[serde(default)]
    pub intent_mappings: BTreeMap<String, String>,

    /// RFC 3339 time of the last save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CorpusSnapshot {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
            && self.generated_responses.is_empty()
            && self.used_responses.is_empty()
            && self.learned_phrases.is_empty()
            && self.intent_mappings.is_empty()
    }
}

/// JSON file holding one [`CorpusSnapshot`]
#[derive(Debug, Clone)]
pub struct TrainingDataStore {
    path: PathBuf,
}

impl TrainingDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TrainingDataStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, resetting the file when it is missing or unusable
    pub fn load(&self) -> CorpusSnapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Loaded {} queries from {}",
                    snapshot.queries.len(),
                    self.path.display()
                );
                snapshot
            }
            Ok(None) => {
                log::info!(
                    "No training data at {}; starting empty",
                    self.path.display()
                );
                self.reset()
            }
            Err(e) => {
                log::error!(
                    "Unusable training data at {} ({}); starting empty",
                    self.path.display(),
                    e
                );
                self.reset()
            }
        }
    }

    /// Read the snapshot without recovery; `None` when the file is absent
    pub fn try_load(&self) -> Result<Option<CorpusSnapshot>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write an empty snapshot, logging failures
    pub fn reset(&self) -> CorpusSnapshot {
        let empty = CorpusSnapshot::default();
        if let Err(e) = self.save(&empty) {
            log::error!("Failed to reset {}: {}", self.path.display(), e);
        }
        empty
    }

    /// Write the snapshot via a sibling temp file and rename
    pub fn save(&self, snapshot: &CorpusSnapshot) -> Result<(), StoreError> {
        let mut stamped = snapshot.clone();
        stamped.updated_at = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(&stamped)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        log::debug!(
            "Saved {} queries to {}",
            snapshot.queries.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "training_data.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
