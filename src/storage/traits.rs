//! Storage trait definitions

use crate::branch::{Branch, BranchPath, ReplacedSet, Timepoint};
use crate::model::{ConceptId, DocKind, Document, HierarchyKind};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One version of a document on one branch
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub path: BranchPath,
    /// Commit timepoint that wrote this version
    pub start: Timepoint,
    /// Commit timepoint that superseded it
    pub end: Option<Timepoint>,
    pub document: Document,
}

impl Versioned {
    pub fn new(path: BranchPath, start: Timepoint, document: impl Into<Document>) -> Self {
        Self {
            path,
            start,
            end: None,
            document: document.into(),
        }
    }

    pub fn kind(&self) -> DocKind {
        self.document.kind()
    }

    pub fn id(&self) -> String {
        self.document.logical_id()
    }

    /// Whether this version is in force at `timepoint`
    pub fn live_at(&self, timepoint: Timepoint) -> bool {
        self.start <= timepoint && self.end.map_or(true, |end| end > timepoint)
    }
}

/// Content of an ancestor branch visible through a descendant
#[derive(Debug, Clone, PartialEq)]
pub struct LineageClause {
    pub path: BranchPath,
    /// Point on the ancestor's timeline the descendant sees
    pub timepoint: Timepoint,
    /// Ids the ancestor itself superseded; hides them on every branch further up
    pub replaced: ReplacedSet,
}

/// What one branch can see at one timepoint
///
/// Own versions live at `timepoint`, plus versions of each ancestor live at
/// the ancestor's clause timepoint unless a nearer branch replaced the id.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchCriteria {
    pub path: BranchPath,
    pub timepoint: Timepoint,
    pub replaced: ReplacedSet,
    /// Ancestor clauses, nearest first
    pub inherited: Vec<LineageClause>,
}

impl BranchCriteria {
    /// Every branch path whose versions may be admitted
    pub fn paths(&self) -> Vec<&BranchPath> {
        std::iter::once(&self.path)
            .chain(self.inherited.iter().map(|c| &c.path))
            .collect()
    }

    pub fn admits(&self, version: &Versioned) -> bool {
        if version.path == self.path {
            return version.live_at(self.timepoint);
        }

        let kind = version.kind();
        let id = version.id();
        if is_replaced(&self.replaced, kind, &id) {
            return false;
        }
        for clause in &self.inherited {
            if clause.path == version.path {
                return version.live_at(clause.timepoint);
            }
            if is_replaced(&clause.replaced, kind, &id) {
                return false;
            }
        }
        false
    }
}

fn is_replaced(replaced: &ReplacedSet, kind: DocKind, id: &str) -> bool {
    replaced.get(&kind).is_some_and(|ids| ids.contains(id))
}

/// Which versions a query considers
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    /// The content a branch sees
    Branch(BranchCriteria),
    /// Versions of one branch started or ended within `(after, up_to]`
    Changed {
        path: BranchPath,
        after: Timepoint,
        up_to: Option<Timepoint>,
    },
}

impl Visibility {
    pub fn paths(&self) -> Vec<&BranchPath> {
        match self {
            Visibility::Branch(criteria) => criteria.paths(),
            Visibility::Changed { path, .. } => vec![path],
        }
    }

    pub fn admits(&self, version: &Versioned) -> bool {
        match self {
            Visibility::Branch(criteria) => criteria.admits(version),
            Visibility::Changed { path, after, up_to } => {
                let within = |t: Timepoint| t > *after && up_to.map_or(true, |u| t <= u);
                &version.path == path && (within(version.start) || version.end.is_some_and(within))
            }
        }
    }
}

/// Relationship type constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeMatch {
    Is(ConceptId),
    IsNot(ConceptId),
}

/// Filter criteria for querying documents
///
/// Criteria that don't apply to a document kind are ignored for it.
#[derive(Debug, Clone, Default)]
pub struct DocFilter {
    pub kind: Option<DocKind>,
    /// Logical ids
    pub ids: Option<BTreeSet<String>>,
    /// Reference ids (concept id, relationship source, entry concept)
    pub refs: Option<BTreeSet<String>>,
    pub active: Option<bool>,
    pub hierarchy: Option<HierarchyKind>,
    pub type_id: Option<TypeMatch>,
    /// Index entries with at least one of these ancestors
    pub ancestors_any: Option<BTreeSet<ConceptId>>,
    /// Index entries with at least one of these direct parents
    pub parents_any: Option<BTreeSet<ConceptId>>,
    /// Index entries carrying an attribute, optionally with a given value
    pub attribute: Option<(ConceptId, Option<ConceptId>)>,
}

impl DocFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: DocKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs = Some(refs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: HierarchyKind) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    pub fn with_type(mut self, type_match: TypeMatch) -> Self {
        self.type_id = Some(type_match);
        self
    }

    pub fn with_ancestors_any(mut self, ancestors: impl IntoIterator<Item = ConceptId>) -> Self {
        self.ancestors_any = Some(ancestors.into_iter().collect());
        self
    }

    pub fn with_parents_any(mut self, parents: impl IntoIterator<Item = ConceptId>) -> Self {
        self.parents_any = Some(parents.into_iter().collect());
        self
    }

    pub fn with_attribute(mut self, attribute: ConceptId, value: Option<ConceptId>) -> Self {
        self.attribute = Some((attribute, value));
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        if self.kind.is_some_and(|k| k != document.kind()) {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&document.logical_id()) {
                return false;
            }
        }
        if let Some(refs) = &self.refs {
            if !refs.contains(document.ref_id()) {
                return false;
            }
        }

        match document {
            Document::Concept(c) => self.active.map_or(true, |a| a == c.active),
            Document::Relationship(r) => {
                self.active.map_or(true, |a| a == r.active)
                    && self.hierarchy.map_or(true, |h| h == r.hierarchy)
                    && match &self.type_id {
                        None => true,
                        Some(TypeMatch::Is(t)) => &r.type_id == t,
                        Some(TypeMatch::IsNot(t)) => &r.type_id != t,
                    }
            }
            Document::IndexEntry(e) => {
                self.hierarchy.map_or(true, |h| h == e.hierarchy)
                    && self
                        .ancestors_any
                        .as_ref()
                        .map_or(true, |set| !e.ancestors.is_disjoint(set))
                    && self
                        .parents_any
                        .as_ref()
                        .map_or(true, |set| !e.parents.is_disjoint(set))
                    && self
                        .attribute
                        .as_ref()
                        .map_or(true, |(attr, value)| e.has_attribute(attr, value.as_ref()))
            }
        }
    }
}

/// Which stored versions to delete
#[derive(Debug, Clone)]
pub struct DeleteCriteria {
    pub path: BranchPath,
    pub kind: Option<DocKind>,
    pub ids: Option<BTreeSet<String>>,
    /// Only versions written by this commit
    pub started_at: Option<Timepoint>,
}

impl DeleteCriteria {
    pub fn on_branch(path: BranchPath) -> Self {
        Self {
            path,
            kind: None,
            ids: None,
            started_at: None,
        }
    }

    pub fn with_kind(mut self, kind: DocKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_ids(mut self, ids: BTreeSet<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn started_at(mut self, timepoint: Timepoint) -> Self {
        self.started_at = Some(timepoint);
        self
    }
}

/// Branch version writes applied in one transaction
#[derive(Debug, Clone, Default)]
pub struct BranchChange {
    /// Versions to insert or overwrite, keyed by (path, start)
    pub upsert: Vec<Branch>,
    /// Versions to remove, keyed by (path, start)
    pub remove: Vec<(BranchPath, Timepoint)>,
}

/// Trait for versioned document storage backends
///
/// Implementations must be thread-safe (Send + Sync) to support
/// concurrent commits on different branches.
pub trait DocumentStore: Send + Sync {
    // === Document Operations ===

    /// Insert versions, overwriting any with the same (kind, id, path, start)
    fn save(&self, versions: &[Versioned]) -> StorageResult<()>;

    /// End the live versions of the given ids on one branch
    fn end_versions(
        &self,
        path: &BranchPath,
        kind: DocKind,
        ids: &BTreeSet<String>,
        at: Timepoint,
    ) -> StorageResult<usize>;

    /// Versions admitted by the visibility rule and matching the filter,
    /// ordered by kind then logical id
    fn query(&self, visibility: &Visibility, filter: &DocFilter) -> StorageResult<Vec<Versioned>>;

    /// Delete stored versions outright
    fn delete(&self, criteria: &DeleteCriteria) -> StorageResult<usize>;

    /// Undo one commit's writes: delete versions started at `at` and reopen
    /// versions ended at `at`
    fn revert(&self, path: &BranchPath, at: Timepoint) -> StorageResult<usize>;

    /// Newest timepoint recorded anywhere in the store
    fn latest_timepoint(&self) -> StorageResult<Option<Timepoint>>;

    // === Branch Operations ===

    /// Every version of a branch, oldest first
    fn branch_versions(&self, path: &BranchPath) -> StorageResult<Vec<Branch>>;

    /// The version currently in force
    fn latest_branch(&self, path: &BranchPath) -> StorageResult<Option<Branch>>;

    /// Current versions of all branches, ordered by path
    fn list_branches(&self) -> StorageResult<Vec<Branch>>;

    /// Insert or overwrite one branch version
    fn save_branch(&self, branch: &Branch) -> StorageResult<()>;

    fn apply_branch_change(&self, change: &BranchChange) -> StorageResult<()>;

    /// The version of a branch in force at a timepoint
    fn branch_at(&self, path: &BranchPath, timepoint: Timepoint) -> StorageResult<Option<Branch>> {
        Ok(self
            .branch_versions(path)?
            .into_iter()
            .find(|b| b.in_force_at(timepoint)))
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: DocumentStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
