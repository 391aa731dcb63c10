//! Termgraph: branch-aware terminology store with a semantic index
//!
//! Concepts and their relationships are kept as versioned documents on a
//! tree of branches. A child branch sees its parent's content as of its
//! base and shadows whatever it changes itself. Every completed commit
//! brings the branch's semantic index (the materialized transitive closure
//! of "is a" edges, stated and inferred) up to date, so subsumption
//! queries are plain reads.
//!
//! # Core Concepts
//!
//! - **Branches**: `MAIN`, `MAIN/PROJECT`, ...; versioned, locked while a commit is open
//! - **Commits**: copy-on-write writes at one timepoint, closed or rolled back as a unit
//! - **Semantic index**: one entry per concept and hierarchy, holding parents and ancestors
//!
//! # Example
//!
//! ```
//! use termgraph::{BranchPath, TermEngine};
//!
//! let engine = TermEngine::in_memory().unwrap();
//! engine.branches().create(&BranchPath::new("MAIN").unwrap()).unwrap();
//! ```

pub mod branch;
pub mod config;
pub mod content;
mod engine;
pub mod index;
pub mod listeners;
pub mod model;
pub mod query;
pub mod storage;

pub use branch::{
    Branch, BranchError, BranchManager, BranchPath, BranchResult, Commit, CommitKind, CommitOutcome,
    Timepoint,
};
pub use config::{Config, ConfigError};
pub use engine::{EngineError, EngineResult, TermEngine};
pub use index::{GraphBuilder, IndexError, SemanticIndexUpdater};
pub use listeners::{CommitListener, ListenerChain, ListenerError};
pub use model::{Concept, ConceptId, DocKind, Document, HierarchyKind, IndexEntry, Relationship, IS_A};
pub use query::{Page, PageRequest, Predicate, QueryError, QueryService};
pub use storage::{DocumentStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
