//! Engine configuration, loaded from YAML

use crate::listeners::{AUDIT, INTEGRITY, SEMANTIC_INDEX};
use crate::model::IS_A;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown commit listener: {0}")]
    UnknownListener(String),

    #[error("Commit listener listed twice: {0}")]
    DuplicateListener(String),

    #[error("The semantic index listener must run first, found {0:?}")]
    IndexNotFirst(Option<String>),

    #[error("batch_save_size must be at least 1")]
    ZeroBatchSize,
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

const KNOWN_LISTENERS: [&str; 3] = [SEMANTIC_INDEX, INTEGRITY, AUDIT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Documents written per store call
    pub batch_save_size: usize,
    /// Relationship type forming the hierarchy
    pub is_a_type_id: String,
    /// Worklist bound, as a multiple of the concepts in one update
    pub max_closure_passes: usize,
    /// Listeners fired on commit completion, in order
    pub commit_listeners: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_save_size: 10_000,
            is_a_type_id: IS_A.to_string(),
            max_closure_passes: 10,
            commit_listeners: KNOWN_LISTENERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the listener order and limits
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_save_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        let first = self.commit_listeners.first();
        if first.map(String::as_str) != Some(SEMANTIC_INDEX) {
            return Err(ConfigError::IndexNotFirst(first.cloned()));
        }
        let mut seen = BTreeSet::new();
        for name in &self.commit_listeners {
            if !KNOWN_LISTENERS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownListener(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateListener(name.clone()));
            }
        }
        Ok(())
    }
}
