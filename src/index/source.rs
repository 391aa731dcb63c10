//! Hierarchy reads against the versioned store

use super::graph_builder::{Closure, HierarchySource};
use crate::model::{ConceptId, DocKind, Document, HierarchyKind, IndexEntry};
use crate::storage::{DocFilter, DocumentStore, StorageResult, TypeMatch, Visibility};
use std::collections::{BTreeMap, BTreeSet};

/// One hierarchy as seen through a visibility rule
pub struct StoredHierarchy<'a> {
    store: &'a dyn DocumentStore,
    visibility: Visibility,
    hierarchy: HierarchyKind,
    is_a: ConceptId,
}

impl<'a> StoredHierarchy<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        visibility: Visibility,
        hierarchy: HierarchyKind,
        is_a: ConceptId,
    ) -> Self {
        Self {
            store,
            visibility,
            hierarchy,
            is_a,
        }
    }

    fn edges(&self) -> DocFilter {
        DocFilter::of_kind(DocKind::Relationship)
            .with_active(true)
            .with_hierarchy(self.hierarchy)
            .with_type(TypeMatch::Is(self.is_a.clone()))
    }

    fn entries(&self) -> DocFilter {
        DocFilter::of_kind(DocKind::IndexEntry).with_hierarchy(self.hierarchy)
    }

    /// Visible index entries for the given concepts
    pub fn entries_for(&self, concepts: &BTreeSet<ConceptId>) -> StorageResult<BTreeMap<ConceptId, IndexEntry>> {
        if concepts.is_empty() {
            return Ok(BTreeMap::new());
        }
        let ids = concepts
            .iter()
            .map(|c| IndexEntry::logical_id(c, self.hierarchy));
        Ok(self
            .store
            .query(&self.visibility, &self.entries().with_ids(ids))?
            .into_iter()
            .filter_map(|v| match v.document {
                Document::IndexEntry(e) => Some((e.concept_id.clone(), e)),
                _ => None,
            })
            .collect())
    }

    /// All visible active edges: source to destinations
    pub fn all_parents(&self) -> StorageResult<BTreeMap<ConceptId, BTreeSet<ConceptId>>> {
        let mut parents: BTreeMap<ConceptId, BTreeSet<ConceptId>> = BTreeMap::new();
        for version in self.store.query(&self.visibility, &self.edges())? {
            if let Some(r) = version.document.as_relationship() {
                parents
                    .entry(r.source_id.clone())
                    .or_default()
                    .insert(r.destination_id.clone());
            }
        }
        Ok(parents)
    }
}

impl HierarchySource for StoredHierarchy<'_> {
    fn active_parents(
        &self,
        concepts: &BTreeSet<ConceptId>,
    ) -> StorageResult<BTreeMap<ConceptId, BTreeSet<ConceptId>>> {
        if concepts.is_empty() {
            return Ok(BTreeMap::new());
        }
        let filter = self.edges().with_refs(concepts.iter().map(|c| c.as_str().to_string()));
        let mut parents: BTreeMap<ConceptId, BTreeSet<ConceptId>> = BTreeMap::new();
        // Any active relationship joining the pair makes the edge active,
        // whatever its id or module
        for version in self.store.query(&self.visibility, &filter)? {
            if let Some(r) = version.document.as_relationship() {
                parents
                    .entry(r.source_id.clone())
                    .or_default()
                    .insert(r.destination_id.clone());
            }
        }
        Ok(parents)
    }

    fn existing_closures(
        &self,
        concepts: &BTreeSet<ConceptId>,
    ) -> StorageResult<BTreeMap<ConceptId, Closure>> {
        Ok(self
            .entries_for(concepts)?
            .into_iter()
            .map(|(c, e)| {
                let closure = Closure {
                    parents: e.parents,
                    ancestors: e.ancestors,
                };
                (c, closure)
            })
            .collect())
    }

    fn existing_descendants(&self, concepts: &BTreeSet<ConceptId>) -> StorageResult<BTreeSet<ConceptId>> {
        if concepts.is_empty() {
            return Ok(BTreeSet::new());
        }
        let filter = self.entries().with_ancestors_any(concepts.iter().cloned());
        Ok(self
            .store
            .query(&self.visibility, &filter)?
            .into_iter()
            .filter_map(|v| v.document.as_entry().map(|e| e.concept_id.clone()))
            .collect())
    }
}
