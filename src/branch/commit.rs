//! Commit windows: copy-on-write writes at one timepoint on one branch

use super::clock::Timepoint;
use super::path::BranchPath;
use super::version::Branch;
use crate::model::{ConceptId, DocKind, Document, HierarchyKind};
use crate::storage::{
    BranchCriteria, DeleteCriteria, DocFilter, DocumentStore, LineageClause, StorageResult,
    Versioned, Visibility,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// What a commit is doing to its branch
#[derive(Debug, Clone, PartialEq)]
pub enum CommitKind {
    /// Ordinary content change
    Content,
    /// Moving the base to the parent head
    Rebase,
    /// Receiving the content of a child branch
    Promotion { source: BranchPath },
    /// Recomputing the semantic index from scratch
    Rebuild,
}

impl CommitKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommitKind::Content => "content",
            CommitKind::Rebase => "rebase",
            CommitKind::Promotion { .. } => "promotion",
            CommitKind::Rebuild => "rebuild",
        }
    }
}

/// In-process claim on a branch, released when dropped
#[derive(Debug)]
pub(crate) struct Reservation {
    open: Arc<DashMap<BranchPath, Timepoint>>,
    path: BranchPath,
    timepoint: Timepoint,
}

impl Reservation {
    /// Claim a branch; `None` if another claim is live
    pub(crate) fn claim(
        open: &Arc<DashMap<BranchPath, Timepoint>>,
        path: &BranchPath,
        timepoint: Timepoint,
    ) -> Option<Self> {
        match open.entry(path.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(timepoint);
                Some(Self {
                    open: open.clone(),
                    path: path.clone(),
                    timepoint,
                })
            }
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.open
            .remove_if(&self.path, |_, timepoint| *timepoint == self.timepoint);
    }
}

/// An open commit on one branch
///
/// Documents saved here get the commit timepoint as version start and end
/// the branch's own prior versions; inherited versions are marked replaced.
/// Nothing becomes visible to readers of the branch until the commit is
/// closed successfully. Dropping a commit without closing it leaves the
/// branch locked with a partial commit.
pub struct Commit {
    store: Arc<dyn DocumentStore>,
    branch: Branch,
    before: BranchCriteria,
    kind: CommitKind,
    inherited: Vec<LineageClause>,
    batch_size: usize,
    written: BTreeMap<DocKind, usize>,
    removed: Vec<Document>,
    cycles: BTreeMap<HierarchyKind, BTreeSet<ConceptId>>,
    _reservation: Reservation,
}

impl Commit {
    pub(crate) fn new(
        store: Arc<dyn DocumentStore>,
        current: &Branch,
        timepoint: Timepoint,
        inherited: Vec<LineageClause>,
        batch_size: usize,
        reservation: Reservation,
    ) -> Self {
        let before = BranchCriteria {
            path: current.path.clone(),
            timepoint: current.head,
            replaced: current.versions_replaced.clone(),
            inherited: inherited.clone(),
        };
        Self {
            store,
            branch: current.next_version(timepoint),
            before,
            kind: CommitKind::Content,
            inherited,
            batch_size: batch_size.max(1),
            written: BTreeMap::new(),
            removed: Vec::new(),
            cycles: BTreeMap::new(),
            _reservation: reservation,
        }
    }

    /// Turn this into a rebase onto a new base
    pub(crate) fn rebase_onto(&mut self, base: Timepoint, inherited: Vec<LineageClause>) {
        self.branch.base = base;
        self.inherited = inherited;
        self.kind = CommitKind::Rebase;
    }

    pub(crate) fn set_kind(&mut self, kind: CommitKind) {
        self.kind = kind;
    }

    pub(crate) fn clear_replaced(&mut self) {
        self.branch.versions_replaced.clear();
    }

    /// The branch version this commit will write
    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    pub fn path(&self) -> &BranchPath {
        &self.branch.path
    }

    pub fn timepoint(&self) -> Timepoint {
        self.branch.start
    }

    /// Head of the branch before this commit
    pub fn previous_head(&self) -> Timepoint {
        self.before.timepoint
    }

    /// What the branch saw before this commit
    pub fn before(&self) -> &BranchCriteria {
        &self.before
    }

    pub fn kind(&self) -> &CommitKind {
        &self.kind
    }

    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.branch.metadata
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// What the branch sees including this commit's writes
    pub fn criteria(&self) -> BranchCriteria {
        BranchCriteria {
            path: self.branch.path.clone(),
            timepoint: self.timepoint(),
            replaced: self.branch.versions_replaced.clone(),
            inherited: self.inherited.clone(),
        }
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::Branch(self.criteria())
    }

    /// Visible documents matching a filter
    pub fn query(&self, filter: &DocFilter) -> StorageResult<Vec<Versioned>> {
        self.store.query(&self.visibility(), filter)
    }

    /// Versions this commit wrote or ended on its own branch
    pub fn changes(&self, filter: &DocFilter) -> StorageResult<Vec<Versioned>> {
        self.changes_on(self.path(), self.timepoint().previous(), self.timepoint(), filter)
    }

    /// Versions of any branch started or ended within `(after, up_to]`
    pub fn changes_on(
        &self,
        path: &BranchPath,
        after: Timepoint,
        up_to: Timepoint,
        filter: &DocFilter,
    ) -> StorageResult<Vec<Versioned>> {
        let visibility = Visibility::Changed {
            path: path.clone(),
            after,
            up_to: Some(up_to),
        };
        self.store.query(&visibility, filter)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Write new versions of documents
    ///
    /// Duplicates by logical id collapse to one version; for relationships
    /// the one with the latest effective time wins, unpublished counting as
    /// latest.
    ///
    /// Concepts are stored without their relationships, which are documents
    /// of their own. Use `content::save_concepts` to write a concept
    /// together with its relationship set.
    pub fn save(&mut self, documents: impl IntoIterator<Item = Document>) -> StorageResult<()> {
        let mut by_kind: BTreeMap<DocKind, BTreeMap<String, Document>> = BTreeMap::new();
        for document in documents {
            let document = match document {
                Document::Concept(c) => Document::Concept(c.without_relationships()),
                other => other,
            };
            let slot = by_kind.entry(document.kind()).or_default();
            let id = document.logical_id();
            let keep_existing = match (slot.get(&id), &document) {
                (Some(Document::Relationship(old)), Document::Relationship(new)) => {
                    effective_rank(old.effective_time) > effective_rank(new.effective_time)
                }
                _ => false,
            };
            if !keep_existing {
                slot.insert(id, document);
            }
        }

        for (kind, documents) in by_kind {
            let documents: Vec<Document> = documents.into_values().collect();
            for batch in documents.chunks(self.batch_size) {
                self.save_batch(kind, batch)?;
            }
        }
        Ok(())
    }

    fn save_batch(&mut self, kind: DocKind, batch: &[Document]) -> StorageResult<()> {
        let ids: BTreeSet<String> = batch.iter().map(|d| d.logical_id()).collect();
        let timepoint = self.timepoint();

        self.store.end_versions(self.path(), kind, &ids, timepoint)?;
        let versions: Vec<Versioned> = batch
            .iter()
            .map(|d| Versioned::new(self.branch.path.clone(), timepoint, d.clone()))
            .collect();
        self.store.save(&versions)?;

        if !self.branch.path.is_root() {
            self.branch.mark_replaced(kind, ids);
        }
        *self.written.entry(kind).or_default() += batch.len();
        debug!(branch = %self.path(), kind = %kind, count = batch.len(), "saved batch");
        Ok(())
    }

    /// Remove documents from the branch's view
    ///
    /// Own versions are ended (or dropped if written by this commit);
    /// inherited ones are hidden. Returns how many visible documents went.
    pub fn delete(&mut self, kind: DocKind, ids: &BTreeSet<String>) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let visible = self.query(&DocFilter::of_kind(kind).with_ids(ids.iter().cloned()))?;

        let timepoint = self.timepoint();
        self.store.delete(
            &DeleteCriteria::on_branch(self.path().clone())
                .with_kind(kind)
                .with_ids(ids.clone())
                .started_at(timepoint),
        )?;
        self.store.end_versions(self.path(), kind, ids, timepoint)?;
        if !self.branch.path.is_root() {
            self.branch.mark_replaced(kind, ids.iter().cloned());
        }

        let count = visible.len();
        self.removed
            .extend(visible.into_iter().map(|v| v.document));
        debug!(branch = %self.path(), kind = %kind, count, "deleted documents");
        Ok(count)
    }

    /// Documents deleted by this commit, as they were visible before
    pub fn removed(&self) -> &[Document] {
        &self.removed
    }

    /// Number of document versions written per kind
    pub fn written(&self) -> &BTreeMap<DocKind, usize> {
        &self.written
    }

    /// Record concepts found in their own ancestor set by a lenient update
    pub fn record_cycles(&mut self, hierarchy: HierarchyKind, concepts: BTreeSet<ConceptId>) {
        if !concepts.is_empty() {
            self.cycles.entry(hierarchy).or_default().extend(concepts);
        }
    }

    pub fn cycles(&self) -> &BTreeMap<HierarchyKind, BTreeSet<ConceptId>> {
        &self.cycles
    }
}

impl std::fmt::Debug for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commit")
            .field("path", &self.branch.path)
            .field("timepoint", &self.branch.start)
            .field("kind", &self.kind.name())
            .finish()
    }
}

fn effective_rank(effective_time: Option<u32>) -> u32 {
    effective_time.unwrap_or(u32::MAX)
}
