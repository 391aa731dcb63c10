//! Shared helpers for termgraph integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use termgraph::content::save_concepts;
use termgraph::storage::DocFilter;
use termgraph::{
    BranchPath, BranchResult, CommitOutcome, Concept, ConceptId, DocKind, HierarchyKind,
    IndexEntry, Relationship, TermEngine,
};

/// An in-memory engine with a MAIN branch
pub fn engine() -> TermEngine {
    let engine = TermEngine::in_memory().unwrap();
    engine.branches().create(&path("MAIN")).unwrap();
    engine
}

pub fn path(s: &str) -> BranchPath {
    BranchPath::new(s).unwrap()
}

/// Stated "is a" relationship with an id derived from its ends
pub fn is_a(source: &str, destination: &str) -> Relationship {
    Relationship::is_a(destination)
        .with_id(format!("{}>{}", source, destination))
        .from_source(source)
}

/// A concept with stated parents
pub fn concept(id: &str, parents: &[&str]) -> Concept {
    parents
        .iter()
        .fold(Concept::new(id), |c, p| c.add_relationship(is_a(id, p)))
}

/// Save concepts (with their full relationship sets) in one commit
pub fn commit_concepts(engine: &TermEngine, branch: &str, concepts: Vec<Concept>) -> BranchResult<CommitOutcome> {
    engine
        .branches()
        .with_commit(&path(branch), |commit| Ok(save_concepts(commit, concepts)?))
        .map(|(_, outcome)| outcome)
}

pub fn ids(values: &[&str]) -> BTreeSet<ConceptId> {
    values.iter().map(|v| ConceptId::from(*v)).collect()
}

pub fn ancestors(engine: &TermEngine, branch: &str, concept: &str) -> BTreeSet<ConceptId> {
    engine
        .query()
        .find_ancestor_ids(&ConceptId::from(concept), &path(branch), HierarchyKind::Stated)
        .unwrap()
}

/// Every visible index entry of a hierarchy, keyed by concept
pub fn entries(engine: &TermEngine, branch: &str, hierarchy: HierarchyKind) -> BTreeMap<ConceptId, IndexEntry> {
    let visibility = engine.branches().visibility(&path(branch)).unwrap();
    let filter = DocFilter::of_kind(DocKind::IndexEntry).with_hierarchy(hierarchy);
    engine
        .store()
        .query(&visibility, &filter)
        .unwrap()
        .into_iter()
        .filter_map(|v| v.document.as_entry().cloned())
        .map(|e| (e.concept_id.clone(), e))
        .collect()
}

/// Ancestors by walking a parent map; the reference the index must match
pub fn reachable(parents: &BTreeMap<String, BTreeSet<String>>, concept: &str) -> BTreeSet<ConceptId> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<&String> = parents.get(concept).into_iter().flatten().collect();
    while let Some(next) = stack.pop() {
        if seen.insert(next.clone()) {
            stack.extend(parents.get(next.as_str()).into_iter().flatten());
        }
    }
    seen.into_iter().map(ConceptId::from).collect()
}
