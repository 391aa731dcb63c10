//! Commit listeners: hooks fired, in configured order, when a commit closes
//! successfully
//!
//! Each listener sees the content left by every listener before it in the
//! same commit, and may write to the commit itself. The first error fails
//! the commit and its writes are reverted.

mod audit;
mod integrity;

pub use audit::AuditLog;
pub use integrity::{IntegrityCheck, INTEGRITY_ISSUE};

use crate::branch::Commit;
use crate::config::{Config, ConfigError};
use crate::index::{IndexError, SemanticIndexUpdater};
use crate::storage::StorageError;
use thiserror::Error;
use tracing::debug;

pub const SEMANTIC_INDEX: &str = "semantic-index";
pub const INTEGRITY: &str = "integrity";
pub const AUDIT: &str = "audit";

/// Errors raised by commit listeners
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for commit listeners
pub type ListenerResult<T> = Result<T, ListenerError>;

/// A hook run on commit completion
pub trait CommitListener {
    fn name(&self) -> &'static str;

    fn on_commit_complete(&self, commit: &mut Commit) -> ListenerResult<()>;
}

impl CommitListener for SemanticIndexUpdater {
    fn name(&self) -> &'static str {
        SEMANTIC_INDEX
    }

    fn on_commit_complete(&self, commit: &mut Commit) -> ListenerResult<()> {
        Ok(self.update(commit)?)
    }
}

/// The closed set of listeners
#[derive(Debug, Clone)]
pub enum Listener {
    SemanticIndex(SemanticIndexUpdater),
    Integrity(IntegrityCheck),
    Audit(AuditLog),
}

impl CommitListener for Listener {
    fn name(&self) -> &'static str {
        match self {
            Listener::SemanticIndex(l) => l.name(),
            Listener::Integrity(l) => l.name(),
            Listener::Audit(l) => l.name(),
        }
    }

    fn on_commit_complete(&self, commit: &mut Commit) -> ListenerResult<()> {
        match self {
            Listener::SemanticIndex(l) => l.on_commit_complete(commit),
            Listener::Integrity(l) => l.on_commit_complete(commit),
            Listener::Audit(l) => l.on_commit_complete(commit),
        }
    }
}

/// Listeners in firing order
#[derive(Debug, Clone, Default)]
pub struct ListenerChain {
    listeners: Vec<Listener>,
}

impl ListenerChain {
    /// A chain that does nothing; commits are not indexed
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the configured chain
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let listeners = config
            .commit_listeners
            .iter()
            .map(|name| match name.as_str() {
                SEMANTIC_INDEX => Ok(Listener::SemanticIndex(SemanticIndexUpdater::new(
                    config.is_a_type_id.as_str(),
                    config.max_closure_passes,
                ))),
                INTEGRITY => Ok(Listener::Integrity(IntegrityCheck)),
                AUDIT => Ok(Listener::Audit(AuditLog)),
                other => Err(ConfigError::UnknownListener(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { listeners })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Run every listener in order, stopping at the first failure
    pub fn fire(&self, commit: &mut Commit) -> ListenerResult<()> {
        for listener in &self.listeners {
            debug!(branch = %commit.path(), listener = listener.name(), "firing commit listener");
            listener.on_commit_complete(commit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_follows_configured_order() {
        let chain = ListenerChain::from_config(&Config::default()).unwrap();
        assert_eq!(chain.names(), vec![SEMANTIC_INDEX, INTEGRITY, AUDIT]);

        let config = Config {
            commit_listeners: vec![SEMANTIC_INDEX.into(), AUDIT.into(), INTEGRITY.into()],
            ..Config::default()
        };
        let chain = ListenerChain::from_config(&config).unwrap();
        assert_eq!(chain.names(), vec![SEMANTIC_INDEX, AUDIT, INTEGRITY]);

        let config = Config {
            commit_listeners: vec![INTEGRITY.into(), SEMANTIC_INDEX.into()],
            ..Config::default()
        };
        assert!(ListenerChain::from_config(&config).is_err());
    }
}
