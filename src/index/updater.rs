//! Keeps a branch's semantic index in step with its content
//!
//! Runs inside a commit, after content has been written and before the
//! commit is advertised. Content commits are indexed strictly: a concept
//! reaching itself through "is a" edges fails the commit. Rebase,
//! promotion and rebuild tolerate cycles, since the content already exists
//! and the index has to follow it; the cycle is reported on the commit.

use super::graph_builder::{Closure, ClosureMode, ClosureRequest, EdgeChange, GraphBuilder};
use super::source::StoredHierarchy;
use super::IndexResult;
use crate::branch::{Commit, CommitKind, ReplacedSet, Timepoint};
use crate::model::{ConceptId, DocKind, Document, HierarchyKind, IndexEntry};
use crate::storage::{BranchCriteria, DocFilter, TypeMatch, Visibility};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Everything a commit changed that bears on one hierarchy
#[derive(Debug, Default)]
struct ChangeSet {
    edges: Vec<EdgeChange>,
    /// Sources of changed non-hierarchy relationships
    attribute_sources: BTreeSet<ConceptId>,
    /// Concepts whose own document or index entry changed
    concepts: BTreeSet<ConceptId>,
    revisit_descendants: bool,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.attribute_sources.is_empty() && self.concepts.is_empty()
    }

    /// Take note of one changed document; `live` tells whether it is
    /// present after the change
    fn record(&mut self, document: &Document, live: bool, hierarchy: HierarchyKind, is_a: &ConceptId) {
        match document {
            Document::Relationship(r) if r.hierarchy == hierarchy => {
                if &r.type_id == is_a {
                    let edge = if live && r.active {
                        EdgeChange::added(&r.source_id, &r.destination_id)
                    } else {
                        EdgeChange::removed(&r.source_id, &r.destination_id)
                    };
                    self.edges.push(edge);
                } else {
                    self.attribute_sources.insert(r.source_id.clone());
                }
            }
            Document::Relationship(_) => {}
            Document::Concept(c) => {
                self.concepts.insert(c.id.clone());
            }
            Document::IndexEntry(e) if e.hierarchy == hierarchy => {
                self.concepts.insert(e.concept_id.clone());
            }
            Document::IndexEntry(_) => {}
        }
    }
}

/// Commit listener maintaining both hierarchies' index entries
#[derive(Debug, Clone)]
pub struct SemanticIndexUpdater {
    is_a: ConceptId,
    max_passes: usize,
}

impl SemanticIndexUpdater {
    pub fn new(is_a: impl Into<ConceptId>, max_passes: usize) -> Self {
        Self {
            is_a: is_a.into(),
            max_passes,
        }
    }

    pub fn is_a(&self) -> &ConceptId {
        &self.is_a
    }

    /// Bring the index up to date with the commit's writes
    pub fn update(&self, commit: &mut Commit) -> IndexResult<()> {
        let mode = match commit.kind() {
            CommitKind::Content => ClosureMode::Strict,
            _ => ClosureMode::Lenient,
        };
        for hierarchy in HierarchyKind::ALL {
            if *commit.kind() == CommitKind::Rebuild {
                self.rebuild(commit, hierarchy)?;
            } else {
                self.incremental(commit, hierarchy, mode)?;
            }
        }
        Ok(())
    }

    fn builder(&self, commit: &Commit, mode: ClosureMode) -> GraphBuilder {
        GraphBuilder::new(commit.path().clone(), mode).with_max_passes(self.max_passes)
    }

    fn incremental(&self, commit: &mut Commit, hierarchy: HierarchyKind, mode: ClosureMode) -> IndexResult<()> {
        let changes = self.collect_changes(commit, hierarchy)?;
        if changes.is_empty() {
            debug!(branch = %commit.path(), hierarchy = %hierarchy, "no changes for semantic index");
            return Ok(());
        }

        let store = commit.store().clone();
        let source = StoredHierarchy::new(store.as_ref(), commit.visibility(), hierarchy, self.is_a.clone());

        // Attribute changes alone leave the closure as it is, unless the
        // concept has never been indexed
        let attribute_only: BTreeSet<ConceptId> = changes
            .attribute_sources
            .iter()
            .filter(|c| !changes.concepts.contains(*c) && !changes.edges.iter().any(|e| &e.source == *c))
            .cloned()
            .collect();
        let indexed = source.entries_for(&attribute_only)?;

        let mut request = ClosureRequest {
            edges: changes.edges,
            concepts: changes.concepts,
            revisit_descendants: changes.revisit_descendants,
        };
        request
            .concepts
            .extend(attribute_only.iter().filter(|c| !indexed.contains_key(*c)).cloned());

        let update = self.builder(commit, mode).update(&source, &request)?;
        if mode == ClosureMode::Lenient {
            commit.record_cycles(hierarchy, update.cycles.clone());
        }

        let mut closures = update.closures;
        for (concept, entry) in indexed {
            closures.entry(concept).or_insert(Closure {
                parents: entry.parents,
                ancestors: entry.ancestors,
            });
        }
        let mut touched: BTreeSet<ConceptId> = closures.keys().cloned().collect();
        touched.extend(request.concepts);
        touched.extend(attribute_only);

        let (written, removed) = self.write_entries(commit, &source, hierarchy, &touched, &closures)?;
        info!(
            branch = %commit.path(),
            hierarchy = %hierarchy,
            recomputed = touched.len(),
            written,
            removed,
            passes = update.passes,
            "semantic index updated"
        );
        Ok(())
    }

    fn rebuild(&self, commit: &mut Commit, hierarchy: HierarchyKind) -> IndexResult<()> {
        let store = commit.store().clone();
        let source = StoredHierarchy::new(store.as_ref(), commit.visibility(), hierarchy, self.is_a.clone());

        let parents = source.all_parents()?;
        let update = self.builder(commit, ClosureMode::Lenient).full(&parents)?;
        commit.record_cycles(hierarchy, update.cycles.clone());

        let mut touched: BTreeSet<ConceptId> = update.closures.keys().cloned().collect();
        for version in commit.query(&DocFilter::of_kind(DocKind::Concept))? {
            if let Some(c) = version.document.as_concept() {
                touched.insert(c.id.clone());
            }
        }
        let entries = DocFilter::of_kind(DocKind::IndexEntry).with_hierarchy(hierarchy);
        for version in commit.query(&entries)? {
            if let Some(e) = version.document.as_entry() {
                touched.insert(e.concept_id.clone());
            }
        }

        let (written, removed) = self.write_entries(commit, &source, hierarchy, &touched, &update.closures)?;
        info!(
            branch = %commit.path(),
            hierarchy = %hierarchy,
            concepts = touched.len(),
            written,
            removed,
            passes = update.passes,
            "semantic index rebuilt"
        );
        Ok(())
    }

    /// Write the entries of `touched` that differ from what is visible and
    /// remove those of concepts that are gone or inactive
    fn write_entries(
        &self,
        commit: &mut Commit,
        source: &StoredHierarchy<'_>,
        hierarchy: HierarchyKind,
        touched: &BTreeSet<ConceptId>,
        closures: &BTreeMap<ConceptId, Closure>,
    ) -> IndexResult<(usize, usize)> {
        if touched.is_empty() {
            return Ok((0, 0));
        }
        let ids = || touched.iter().map(|c| c.as_str().to_string());

        let active: BTreeSet<ConceptId> = commit
            .query(&DocFilter::of_kind(DocKind::Concept).with_ids(ids()).with_active(true))?
            .into_iter()
            .filter_map(|v| v.document.as_concept().map(|c| c.id.clone()))
            .collect();
        let current = source.entries_for(touched)?;

        let mut attributes: BTreeMap<ConceptId, BTreeMap<ConceptId, BTreeSet<ConceptId>>> = BTreeMap::new();
        let attribute_filter = DocFilter::of_kind(DocKind::Relationship)
            .with_refs(active.iter().map(|c| c.as_str().to_string()))
            .with_active(true)
            .with_hierarchy(hierarchy)
            .with_type(TypeMatch::IsNot(self.is_a.clone()));
        if !active.is_empty() {
            for version in commit.query(&attribute_filter)? {
                if let Some(r) = version.document.as_relationship() {
                    attributes
                        .entry(r.source_id.clone())
                        .or_default()
                        .entry(r.type_id.clone())
                        .or_default()
                        .insert(r.destination_id.clone());
                }
            }
        }

        let mut save = Vec::new();
        let mut delete = BTreeSet::new();
        for concept in touched {
            if active.contains(concept) {
                let closure = closures.get(concept).cloned().unwrap_or_default();
                let entry = IndexEntry {
                    concept_id: concept.clone(),
                    hierarchy,
                    parents: closure.parents,
                    ancestors: closure.ancestors,
                    attributes: attributes.remove(concept).unwrap_or_default(),
                };
                if current.get(concept) != Some(&entry) {
                    save.push(Document::from(entry));
                }
            } else if current.contains_key(concept) {
                delete.insert(IndexEntry::logical_id(concept, hierarchy));
            }
        }

        let written = save.len();
        commit.save(save)?;
        let removed = commit.delete(DocKind::IndexEntry, &delete)?;
        Ok((written, removed))
    }

    fn collect_changes(&self, commit: &Commit, hierarchy: HierarchyKind) -> IndexResult<ChangeSet> {
        let timepoint = commit.timepoint();
        let mut changes = ChangeSet::default();
        for version in commit.changes(&DocFilter::new())? {
            let live = version.start == timepoint && version.end.is_none();
            changes.record(&version.document, live, hierarchy, &self.is_a);
        }
        for document in commit.removed() {
            changes.record(document, false, hierarchy, &self.is_a);
        }

        if *commit.kind() == CommitKind::Rebase {
            self.collect_rebase_changes(commit, hierarchy, &mut changes)?;
        }
        Ok(changes)
    }

    /// What moving the base brought in: ancestor content changed between
    /// the old and new lineage, ids whose replacement changed, and the
    /// branch's own live content, which may now sit on a different
    /// hierarchy
    fn collect_rebase_changes(
        &self,
        commit: &Commit,
        hierarchy: HierarchyKind,
        changes: &mut ChangeSet,
    ) -> IndexResult<()> {
        changes.revisit_descendants = true;
        let before = commit.before().clone();
        let after = commit.criteria();

        let mut replaced = ReplacedSet::new();
        add_difference(&mut replaced, &before.replaced, &after.replaced);
        for clause in &after.inherited {
            let old = before.inherited.iter().find(|c| c.path == clause.path);
            let (from, to) = match old {
                Some(old) if old.timepoint <= clause.timepoint => (old.timepoint, clause.timepoint),
                Some(old) => (clause.timepoint, old.timepoint),
                None => (Timepoint::from_millis(0), clause.timepoint),
            };
            if from < to {
                for version in commit.changes_on(&clause.path, from, to, &DocFilter::new())? {
                    let live = version.live_at(clause.timepoint);
                    changes.record(&version.document, live, hierarchy, &self.is_a);
                }
            }
            if let Some(old) = old {
                add_difference(&mut replaced, &old.replaced, &clause.replaced);
            }
        }

        for (kind, ids) in replaced {
            let filter = DocFilter::of_kind(kind).with_ids(ids);
            for (criteria, live) in [(&before, false), (&after, true)] {
                let visibility = Visibility::Branch(criteria.clone());
                for version in commit.store().query(&visibility, &filter)? {
                    changes.record(&version.document, live, hierarchy, &self.is_a);
                }
            }
        }

        let own = Visibility::Branch(BranchCriteria {
            path: commit.path().clone(),
            timepoint: commit.timepoint(),
            replaced: BTreeMap::new(),
            inherited: Vec::new(),
        });
        for version in commit.store().query(&own, &DocFilter::new())? {
            changes.record(&version.document, true, hierarchy, &self.is_a);
        }
        Ok(())
    }
}

/// Collect ids replaced in one set but not the other
fn add_difference(into: &mut ReplacedSet, a: &ReplacedSet, b: &ReplacedSet) {
    let empty = BTreeSet::new();
    for kind in DocKind::ALL {
        let left = a.get(&kind).unwrap_or(&empty);
        let right = b.get(&kind).unwrap_or(&empty);
        let changed: Vec<String> = left.symmetric_difference(right).cloned().collect();
        if !changed.is_empty() {
            into.entry(kind).or_default().extend(changed);
        }
    }
}
