//! Read-only queries over the semantic index
//!
//! Every answer is read from materialized index entries; nothing here
//! walks relationships or computes closures.

mod service;
mod types;

pub use service::{QueryError, QueryResult, QueryService};
pub use types::{Page, PageRequest, Predicate};
