//! Versioned document storage
//!
//! Storage backends implement the `DocumentStore` trait: versioned CRUD
//! plus branch-aware filtered queries. `SqliteStore` is the persistent
//! implementation.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    BranchChange, BranchCriteria, DeleteCriteria, DocFilter, DocumentStore, LineageClause,
    OpenStore, StorageError, StorageResult, TypeMatch, Versioned, Visibility,
};
