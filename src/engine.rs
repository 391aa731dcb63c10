//! TermEngine: the process-scoped wiring of store, branches and queries

use crate::branch::{BranchError, BranchManager};
use crate::config::{Config, ConfigError};
use crate::listeners::ListenerChain;
use crate::query::QueryService;
use crate::storage::{DocumentStore, OpenStore, SqliteStore, StorageError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors that can occur starting the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Branch(#[from] BranchError),
}

/// Result type for engine construction
pub type EngineResult<T> = Result<T, EngineError>;

/// Built once at startup and passed by reference
pub struct TermEngine {
    config: Config,
    branches: Arc<BranchManager>,
    query: QueryService,
}

impl TermEngine {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> EngineResult<Self> {
        let listeners = ListenerChain::from_config(&config)?;
        info!(listeners = ?listeners.names(), batch = config.batch_save_size, "starting engine");
        let branches = Arc::new(BranchManager::new(store, listeners, config.batch_save_size)?);
        let query = QueryService::new(branches.clone());
        Ok(Self {
            config,
            branches,
            query,
        })
    }

    /// Engine over a SQLite file
    pub fn open(config: Config, db: impl AsRef<Path>) -> EngineResult<Self> {
        let store = SqliteStore::open(db)?;
        Self::new(config, Arc::new(store))
    }

    /// Engine over a fresh in-memory store with default configuration
    pub fn in_memory() -> EngineResult<Self> {
        let store = SqliteStore::open_in_memory()?;
        Self::new(Config::default(), Arc::new(store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn branches(&self) -> &BranchManager {
        &self.branches
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        self.branches.store()
    }
}
