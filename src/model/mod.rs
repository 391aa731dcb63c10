//! Terminology content: concepts, relationships and index entries

mod concept;
mod document;
mod entry;
mod relationship;

pub use concept::{Concept, ConceptId, CORE_MODULE};
pub use document::{DocKind, Document};
pub use entry::IndexEntry;
pub use relationship::{HierarchyKind, Relationship, IS_A};
