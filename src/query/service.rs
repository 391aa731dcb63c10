use super::types::{Page, PageRequest, Predicate};
use crate::branch::{BranchError, BranchManager, BranchPath};
use crate::model::{ConceptId, DocKind, HierarchyKind, IndexEntry};
use crate::storage::{DocFilter, StorageError, Visibility};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur answering a query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Concept {concept} not found in the {hierarchy} index of branch {branch}")]
    ConceptNotFound {
        concept: ConceptId,
        branch: BranchPath,
        hierarchy: HierarchyKind,
    },
}

/// Result type for queries
pub type QueryResult<T> = Result<T, QueryError>;

/// Subsumption and structural queries against a branch's index
pub struct QueryService {
    branches: Arc<BranchManager>,
}

impl QueryService {
    pub fn new(branches: Arc<BranchManager>) -> Self {
        Self { branches }
    }

    fn entries(
        &self,
        visibility: &Visibility,
        filter: DocFilter,
    ) -> QueryResult<Vec<IndexEntry>> {
        Ok(self
            .branches
            .store()
            .query(visibility, &filter)?
            .into_iter()
            .filter_map(|v| v.document.as_entry().cloned())
            .collect())
    }

    fn entry(&self, concept: &ConceptId, branch: &BranchPath, hierarchy: HierarchyKind) -> QueryResult<IndexEntry> {
        let visibility = self.branches.visibility(branch)?;
        let filter = DocFilter::of_kind(DocKind::IndexEntry)
            .with_ids([IndexEntry::logical_id(concept, hierarchy)]);
        self.entries(&visibility, filter)?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::ConceptNotFound {
                concept: concept.clone(),
                branch: branch.clone(),
                hierarchy,
            })
    }

    /// Every ancestor of a concept
    pub fn find_ancestor_ids(
        &self,
        concept: &ConceptId,
        branch: &BranchPath,
        hierarchy: HierarchyKind,
    ) -> QueryResult<BTreeSet<ConceptId>> {
        Ok(self.entry(concept, branch, hierarchy)?.ancestors)
    }

    /// Direct parents of a concept
    pub fn find_parent_ids(
        &self,
        concept: &ConceptId,
        branch: &BranchPath,
        hierarchy: HierarchyKind,
    ) -> QueryResult<BTreeSet<ConceptId>> {
        Ok(self.entry(concept, branch, hierarchy)?.parents)
    }

    /// Union of the ancestors of many concepts; unknown seeds contribute nothing
    pub fn find_ancestor_ids_as_union(
        &self,
        branch: &BranchPath,
        hierarchy: HierarchyKind,
        seeds: &BTreeSet<ConceptId>,
    ) -> QueryResult<BTreeSet<ConceptId>> {
        if seeds.is_empty() {
            return Ok(BTreeSet::new());
        }
        let visibility = self.branches.visibility(branch)?;
        let filter = DocFilter::of_kind(DocKind::IndexEntry)
            .with_ids(seeds.iter().map(|c| IndexEntry::logical_id(c, hierarchy)));
        Ok(self
            .entries(&visibility, filter)?
            .into_iter()
            .flat_map(|e| e.ancestors)
            .collect())
    }

    /// Every concept the given one is an ancestor of
    pub fn find_descendant_ids(
        &self,
        concept: &ConceptId,
        branch: &BranchPath,
        hierarchy: HierarchyKind,
    ) -> QueryResult<BTreeSet<ConceptId>> {
        let visibility = self.branches.visibility(branch)?;
        self.descendants(&visibility, concept, hierarchy)
    }

    /// Concepts the given one is a direct parent of
    pub fn find_child_ids(
        &self,
        concept: &ConceptId,
        branch: &BranchPath,
        hierarchy: HierarchyKind,
    ) -> QueryResult<BTreeSet<ConceptId>> {
        let visibility = self.branches.visibility(branch)?;
        let filter = DocFilter::of_kind(DocKind::IndexEntry)
            .with_hierarchy(hierarchy)
            .with_parents_any([concept.clone()]);
        Ok(self
            .entries(&visibility, filter)?
            .into_iter()
            .map(|e| e.concept_id)
            .collect())
    }

    fn descendants(
        &self,
        visibility: &Visibility,
        concept: &ConceptId,
        hierarchy: HierarchyKind,
    ) -> QueryResult<BTreeSet<ConceptId>> {
        let filter = DocFilter::of_kind(DocKind::IndexEntry)
            .with_hierarchy(hierarchy)
            .with_ancestors_any([concept.clone()]);
        Ok(self
            .entries(visibility, filter)?
            .into_iter()
            .map(|e| e.concept_id)
            .collect())
    }

    /// Concepts matching a predicate, sorted by id
    pub fn search(
        &self,
        predicate: &Predicate,
        branch: &BranchPath,
        hierarchy: HierarchyKind,
        page: PageRequest,
    ) -> QueryResult<Page<ConceptId>> {
        let visibility = self.branches.visibility(branch)?;
        let mut search = Search {
            service: self,
            visibility: &visibility,
            hierarchy,
            universe: None,
        };
        let matched = search.eval(predicate)?;
        debug!(branch = %branch, hierarchy = %hierarchy, matched = matched.len(), "search evaluated");
        Ok(Page::slice(matched, page))
    }
}

/// One predicate evaluation; the set of indexed concepts is loaded at most once
struct Search<'a> {
    service: &'a QueryService,
    visibility: &'a Visibility,
    hierarchy: HierarchyKind,
    universe: Option<BTreeSet<ConceptId>>,
}

impl Search<'_> {
    fn entries(&self, filter: DocFilter) -> QueryResult<Vec<IndexEntry>> {
        self.service
            .entries(self.visibility, filter.with_hierarchy(self.hierarchy))
    }

    fn universe(&mut self) -> QueryResult<BTreeSet<ConceptId>> {
        if let Some(universe) = &self.universe {
            return Ok(universe.clone());
        }
        let all: BTreeSet<ConceptId> = self
            .entries(DocFilter::of_kind(DocKind::IndexEntry))?
            .into_iter()
            .map(|e| e.concept_id)
            .collect();
        self.universe = Some(all.clone());
        Ok(all)
    }

    fn eval(&mut self, predicate: &Predicate) -> QueryResult<BTreeSet<ConceptId>> {
        match predicate {
            Predicate::Any => self.universe(),
            Predicate::AncestorOf { concept, or_self } => {
                let filter = DocFilter::of_kind(DocKind::IndexEntry)
                    .with_ids([IndexEntry::logical_id(concept, self.hierarchy)]);
                let mut found = BTreeSet::new();
                for entry in self.entries(filter)? {
                    found.extend(entry.ancestors);
                    if *or_self {
                        found.insert(entry.concept_id);
                    }
                }
                Ok(found)
            }
            Predicate::DescendantOf { concept, or_self } => {
                let mut found = self
                    .service
                    .descendants(self.visibility, concept, self.hierarchy)?;
                if *or_self && self.universe()?.contains(concept) {
                    found.insert(concept.clone());
                }
                Ok(found)
            }
            Predicate::AttributeEquals { attribute, value } => {
                let filter = DocFilter::of_kind(DocKind::IndexEntry)
                    .with_attribute(attribute.clone(), value.clone());
                Ok(self
                    .entries(filter)?
                    .into_iter()
                    .map(|e| e.concept_id)
                    .collect())
            }
            Predicate::And(parts) => {
                let mut parts = parts.iter();
                let mut acc = match parts.next() {
                    Some(first) => self.eval(first)?,
                    None => return self.universe(),
                };
                for part in parts {
                    if acc.is_empty() {
                        break;
                    }
                    let next = self.eval(part)?;
                    acc.retain(|c| next.contains(c));
                }
                Ok(acc)
            }
            Predicate::Or(parts) => {
                let mut acc = BTreeSet::new();
                for part in parts {
                    acc.extend(self.eval(part)?);
                }
                Ok(acc)
            }
            Predicate::Not(inner) => {
                let excluded = self.eval(inner)?;
                let mut all = self.universe()?;
                all.retain(|c| !excluded.contains(c));
                Ok(all)
            }
        }
    }
}
