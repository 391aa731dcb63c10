//! Semantic index: materialized transitive closure per concept and hierarchy

mod graph_builder;
mod source;
mod updater;

pub use graph_builder::{
    Closure, ClosureMode, ClosureRequest, ClosureUpdate, EdgeChange, EdgeChangeKind, GraphBuilder,
    GraphBuilderError, GraphBuilderResult, HierarchySource,
};
pub use source::StoredHierarchy;
pub use updater::SemanticIndexUpdater;

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while maintaining the index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Closure(#[from] GraphBuilderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for index maintenance
pub type IndexResult<T> = Result<T, IndexError>;
