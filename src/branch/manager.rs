//! BranchManager: branch tree, commit lifecycle, rollback and recovery

use super::clock::{Clock, Timepoint};
use super::commit::{Commit, CommitKind, Reservation};
use super::path::{BranchPath, InvalidPath};
use super::version::Branch;
use crate::listeners::{ListenerChain, ListenerError};
use crate::model::{ConceptId, DocKind, Document, HierarchyKind};
use crate::storage::{
    BranchChange, BranchCriteria, DocFilter, DocumentStore, LineageClause, StorageError,
    Visibility,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur in branch operations
#[derive(Debug, Error)]
pub enum BranchError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    #[error("Branch not found: {0}")]
    NotFound(BranchPath),

    #[error("Branch already exists: {0}")]
    AlreadyExists(BranchPath),

    #[error("Parent branch not found: {0}")]
    ParentNotFound(BranchPath),

    #[error("Branch {0} is a root branch and has no parent")]
    NoParent(BranchPath),

    #[error("Branch {0} is locked")]
    Locked(BranchPath),

    #[error("Branch {0} is not locked so there is no partial commit")]
    NotLocked(BranchPath),

    #[error("Branch {0} was left locked by a commit that never closed and must be recovered")]
    PartialCommit(BranchPath),

    #[error("No commit found on branch {path} at timepoint {timepoint}")]
    CommitNotFound { path: BranchPath, timepoint: Timepoint },

    #[error("Branch {path} at timepoint {timepoint} is already ended, it's not the latest commit")]
    NotLatestCommit { path: BranchPath, timepoint: Timepoint },

    #[error("The creation of branch {0} cannot be rolled back")]
    CreationCommit(BranchPath),

    #[error("Branch {0} is behind its parent and must be rebased first")]
    NotUpToDate(BranchPath),

    #[error("Commit listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for branch operations
pub type BranchResult<T> = Result<T, BranchError>;

/// The result of closing a commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Branch version in force after the commit
    pub branch: Branch,
    /// Whether content was advertised
    pub committed: bool,
    /// Concepts left in their own ancestor set by a lenient update
    pub cycles: BTreeMap<HierarchyKind, BTreeSet<ConceptId>>,
}

/// Owns the branch tree and the commit lifecycle
///
/// Commits on one branch are serialized by its lock flag, held from
/// `open_commit` to `close_commit`. Commits on different branches run
/// independently; each sees its ancestors through the lineage fixed by
/// its base.
pub struct BranchManager {
    store: Arc<dyn DocumentStore>,
    listeners: ListenerChain,
    clock: Clock,
    batch_size: usize,
    open: Arc<DashMap<BranchPath, Timepoint>>,
}

impl BranchManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        listeners: ListenerChain,
        batch_size: usize,
    ) -> BranchResult<Self> {
        let clock = match store.latest_timepoint()? {
            Some(latest) => Clock::starting_after(latest),
            None => Clock::new(),
        };
        Ok(Self {
            store,
            listeners,
            clock,
            batch_size,
            open: Arc::new(DashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn listeners(&self) -> &ListenerChain {
        &self.listeners
    }

    fn claim(&self, path: &BranchPath) -> BranchResult<Reservation> {
        Reservation::claim(&self.open, path, self.clock.tick())
            .ok_or_else(|| BranchError::Locked(path.clone()))
    }

    // === Branch tree ===

    /// Create a branch inheriting its parent's content at the parent head
    pub fn create(&self, path: &BranchPath) -> BranchResult<Branch> {
        let _reservation = self.claim(path)?;
        if self.store.latest_branch(path)?.is_some() {
            return Err(BranchError::AlreadyExists(path.clone()));
        }

        let timepoint = self.clock.tick();
        let base = match path.parent() {
            None => timepoint,
            Some(parent) => {
                self.store
                    .latest_branch(&parent)?
                    .ok_or(BranchError::ParentNotFound(parent))?
                    .head
            }
        };

        let branch = Branch::new(path.clone(), base, timepoint);
        self.store.save_branch(&branch)?;
        info!(branch = %path, base = %base, "created branch");
        Ok(branch)
    }

    /// The current version of a branch
    pub fn find(&self, path: &BranchPath) -> BranchResult<Branch> {
        self.store
            .latest_branch(path)?
            .ok_or_else(|| BranchError::NotFound(path.clone()))
    }

    /// The version of a branch in force at a timepoint
    pub fn find_at(&self, path: &BranchPath, timepoint: Timepoint) -> BranchResult<Branch> {
        self.store
            .branch_at(path, timepoint)?
            .ok_or_else(|| BranchError::NotFound(path.clone()))
    }

    pub fn exists(&self, path: &BranchPath) -> BranchResult<bool> {
        Ok(self.store.latest_branch(path)?.is_some())
    }

    pub fn list(&self) -> BranchResult<Vec<Branch>> {
        Ok(self.store.list_branches()?)
    }

    /// Ancestor content visible to a branch version, nearest first
    ///
    /// Each ancestor contributes the version in force at the timepoint the
    /// branch below it is based on.
    pub fn lineage(&self, branch: &Branch) -> BranchResult<Vec<LineageClause>> {
        let mut clauses = Vec::new();
        let mut timepoint = branch.base;
        let mut current = branch.path.clone();
        while let Some(parent) = current.parent() {
            let version = self
                .store
                .branch_at(&parent, timepoint)?
                .ok_or_else(|| BranchError::ParentNotFound(parent.clone()))?;
            clauses.push(LineageClause {
                path: parent.clone(),
                timepoint,
                replaced: version.versions_replaced,
            });
            timepoint = version.base;
            current = parent;
        }
        Ok(clauses)
    }

    /// What a branch version sees at a timepoint
    pub fn criteria(&self, branch: &Branch, timepoint: Timepoint) -> BranchResult<BranchCriteria> {
        Ok(BranchCriteria {
            path: branch.path.clone(),
            timepoint,
            replaced: branch.versions_replaced.clone(),
            inherited: self.lineage(branch)?,
        })
    }

    /// The content a branch advertises at its head
    pub fn visibility(&self, path: &BranchPath) -> BranchResult<Visibility> {
        let branch = self.find(path)?;
        Ok(Visibility::Branch(self.criteria(&branch, branch.head)?))
    }

    /// The content a branch advertised at a past timepoint
    pub fn visibility_at(&self, path: &BranchPath, timepoint: Timepoint) -> BranchResult<Visibility> {
        let branch = self.find_at(path, timepoint)?;
        let timepoint = timepoint.min(branch.head);
        Ok(Visibility::Branch(self.criteria(&branch, timepoint)?))
    }

    // === Commit lifecycle ===

    /// Lock a branch and open a commit window on it
    ///
    /// Fails immediately with `Locked` if a commit is open on the branch in
    /// this process, or with `PartialCommit` if the stored lock has no live
    /// commit behind it.
    pub fn open_commit(&self, path: &BranchPath) -> BranchResult<Commit> {
        let reservation = self.claim(path)?;
        let current = self.find(path)?;
        if current.locked {
            return Err(BranchError::PartialCommit(path.clone()));
        }
        let inherited = self.lineage(&current)?;

        let mut locked = current.clone();
        locked.locked = true;
        self.store.save_branch(&locked)?;

        let timepoint = self.clock.tick();
        debug!(branch = %path, timepoint = %timepoint, "opened commit");
        Ok(Commit::new(
            self.store.clone(),
            &current,
            timepoint,
            inherited,
            self.batch_size,
            reservation,
        ))
    }

    /// Close a commit
    ///
    /// On success the listener chain runs in order and the branch head
    /// advances to the commit timepoint. On failure, or if a listener
    /// fails, every write of the commit is reverted and the branch unlocked.
    pub fn close_commit(&self, mut commit: Commit, success: bool) -> BranchResult<CommitOutcome> {
        let path = commit.path().clone();
        let timepoint = commit.timepoint();

        if !success {
            let branch = self.abort(&commit)?;
            info!(branch = %path, timepoint = %timepoint, "commit aborted");
            return Ok(CommitOutcome {
                branch,
                committed: false,
                cycles: BTreeMap::new(),
            });
        }

        if let Err(e) = self.listeners.fire(&mut commit) {
            warn!(branch = %path, timepoint = %timepoint, error = %e, "commit listener failed, reverting commit");
            self.abort(&commit)?;
            return Err(e.into());
        }

        for (hierarchy, concepts) in commit.cycles() {
            warn!(
                branch = %path,
                hierarchy = %hierarchy,
                concepts = ?concepts,
                "commit completed with concepts in their own ancestor set"
            );
        }

        let mut ended = self.find(&path)?;
        ended.end = Some(timepoint);
        ended.locked = false;
        let next = commit.branch().clone();
        let change = BranchChange {
            upsert: vec![ended, next.clone()],
            remove: Vec::new(),
        };
        if let Err(e) = self.store.apply_branch_change(&change) {
            self.abort(&commit)?;
            return Err(e.into());
        }

        info!(
            branch = %path,
            timepoint = %timepoint,
            kind = commit.kind().name(),
            "commit completed"
        );
        Ok(CommitOutcome {
            branch: next,
            committed: true,
            cycles: commit.cycles().clone(),
        })
    }

    /// Revert a commit's writes and unlock its branch
    fn abort(&self, commit: &Commit) -> BranchResult<Branch> {
        let reverted = self.store.revert(commit.path(), commit.timepoint())?;
        let mut current = self.find(commit.path())?;
        current.locked = false;
        self.store.save_branch(&current)?;
        debug!(branch = %commit.path(), reverted, "reverted commit writes");
        Ok(current)
    }

    /// Run `f` inside a commit, closing it according to the result
    pub fn with_commit<T, F>(&self, path: &BranchPath, f: F) -> BranchResult<(T, CommitOutcome)>
    where
        F: FnOnce(&mut Commit) -> BranchResult<T>,
    {
        let mut commit = self.open_commit(path)?;
        match f(&mut commit) {
            Ok(value) => {
                let outcome = self.close_commit(commit, true)?;
                Ok((value, outcome))
            }
            Err(e) => {
                self.close_commit(commit, false)?;
                Err(e)
            }
        }
    }

    // === Rollback and recovery ===

    /// Revert the branch's most recent completed commit
    ///
    /// `timepoint` may be any point within that commit's branch version.
    /// Rejected if the version has already been superseded.
    pub fn rollback_commit(&self, path: &BranchPath, timepoint: Timepoint) -> BranchResult<Branch> {
        let _reservation = self.claim(path)?;
        let versions = self.store.branch_versions(path)?;
        let latest = versions
            .last()
            .ok_or_else(|| BranchError::NotFound(path.clone()))?;
        if latest.locked {
            return Err(BranchError::PartialCommit(path.clone()));
        }
        self.undo(path, timepoint, &versions)
    }

    fn undo(&self, path: &BranchPath, timepoint: Timepoint, versions: &[Branch]) -> BranchResult<Branch> {
        let index = versions
            .iter()
            .position(|v| v.in_force_at(timepoint))
            .ok_or_else(|| BranchError::CommitNotFound {
                path: path.clone(),
                timepoint,
            })?;
        let target = &versions[index];
        if target.end.is_some() {
            return Err(BranchError::NotLatestCommit {
                path: path.clone(),
                timepoint,
            });
        }
        if index == 0 {
            return Err(BranchError::CreationCommit(path.clone()));
        }

        let reverted = self.store.revert(path, target.start)?;
        let mut previous = versions[index - 1].clone();
        previous.end = None;
        previous.locked = false;
        self.store.apply_branch_change(&BranchChange {
            upsert: vec![previous.clone()],
            remove: vec![(path.clone(), target.start)],
        })?;

        info!(branch = %path, timepoint = %target.start, reverted, "rolled back commit");
        Ok(previous)
    }

    /// Recover a branch left locked by a commit that never closed
    ///
    /// The partial writes are closed off as a commit of their own at the
    /// last detected write, then rolled back, leaving the branch unlocked.
    /// A commit that died before writing anything only needs the unlock.
    pub fn rollback_partial_commit(&self, path: &BranchPath) -> BranchResult<Branch> {
        let _reservation = self.claim(path)?;
        let latest = self.find(path)?;
        if !latest.locked {
            return Err(BranchError::NotLocked(path.clone()));
        }

        let changed = self.store.query(
            &Visibility::Changed {
                path: path.clone(),
                after: latest.start,
                up_to: None,
            },
            &DocFilter::new(),
        )?;
        let partial = changed
            .iter()
            .flat_map(|v| std::iter::once(v.start).chain(v.end))
            .filter(|t| *t > latest.start)
            .max();
        let Some(partial) = partial else {
            let mut unlocked = latest;
            unlocked.locked = false;
            self.store.save_branch(&unlocked)?;
            info!(branch = %path, "no partial writes found, unlocked branch");
            return Ok(unlocked);
        };

        info!(
            branch = %path,
            timepoint = %partial,
            "found partial commit, closing the branch there and rolling back"
        );

        let mut ended = latest.clone();
        ended.end = Some(partial);
        let temporary = Branch {
            start: partial,
            head: partial,
            end: None,
            ..latest
        };
        self.store.apply_branch_change(&BranchChange {
            upsert: vec![ended, temporary],
            remove: Vec::new(),
        })?;

        let versions = self.store.branch_versions(path)?;
        self.undo(path, partial, &versions)
    }

    // === Rebase, promotion and rebuild ===

    /// Move a branch's base to its parent's head
    ///
    /// The branch's semantic index is brought up to date in lenient mode.
    /// A branch already based on its parent's head is left alone.
    pub fn rebase(&self, path: &BranchPath) -> BranchResult<CommitOutcome> {
        let parent_path = path.parent().ok_or_else(|| BranchError::NoParent(path.clone()))?;
        let branch = self.find(path)?;
        let parent = self.find(&parent_path)?;
        if !branch.is_behind(&parent) {
            info!(branch = %path, "branch is up to date, nothing to rebase");
            return Ok(CommitOutcome {
                branch,
                committed: false,
                cycles: BTreeMap::new(),
            });
        }

        self.with_commit(path, |commit| {
            let parent = self.find(&parent_path)?;
            let mut pending = commit.branch().clone();
            pending.base = parent.head;
            let inherited = self.lineage(&pending)?;
            commit.rebase_onto(parent.head, inherited);
            info!(branch = %path, from = %commit.before().timepoint, onto = %parent.head, "rebasing");
            Ok(())
        })
        .map(|(_, outcome)| outcome)
    }

    /// Copy a branch's own content onto its parent
    ///
    /// The branch must be up to date with its parent. Afterwards its own
    /// versions are ended and it is rebased onto the new parent head, so it
    /// sees exactly what it promoted. Returns the parent's commit outcome.
    pub fn promote(&self, path: &BranchPath) -> BranchResult<CommitOutcome> {
        let parent_path = path.parent().ok_or_else(|| BranchError::NoParent(path.clone()))?;
        let mut child = self.open_commit(path)?;

        let promoted = self.promote_into_parent(&child, &parent_path);
        let outcome = match promoted {
            Ok(outcome) => outcome,
            Err(e) => {
                self.close_commit(child, false)?;
                return Err(e);
            }
        };

        if let Err(e) = self.reset_onto_parent(&mut child, &parent_path) {
            self.close_commit(child, false)?;
            return Err(e);
        }
        let child_outcome = self.close_commit(child, true)?;
        info!(
            branch = %path,
            parent = %parent_path,
            head = %child_outcome.branch.head,
            "promoted branch content"
        );
        Ok(outcome)
    }

    fn promote_into_parent(&self, child: &Commit, parent_path: &BranchPath) -> BranchResult<CommitOutcome> {
        let parent = self.find(parent_path)?;
        if child.branch().is_behind(&parent) {
            return Err(BranchError::NotUpToDate(child.path().clone()));
        }

        let own = own_content(child, child.previous_head())?;
        let mut deleted: BTreeMap<DocKind, BTreeSet<String>> = BTreeMap::new();
        for kind in [DocKind::Concept, DocKind::Relationship] {
            let live: BTreeSet<String> = own
                .iter()
                .filter(|d| d.kind() == kind)
                .map(|d| d.logical_id())
                .collect();
            if let Some(replaced) = child.before().replaced.get(&kind) {
                let gone: BTreeSet<String> = replaced.difference(&live).cloned().collect();
                if !gone.is_empty() {
                    deleted.insert(kind, gone);
                }
            }
        }

        let source = child.path().clone();
        self.with_commit(parent_path, |commit| {
            commit.set_kind(CommitKind::Promotion { source });
            commit.save(own.into_iter().filter(|d| d.kind() != DocKind::IndexEntry))?;
            for (kind, ids) in &deleted {
                commit.delete(*kind, ids)?;
            }
            Ok(())
        })
        .map(|(_, outcome)| outcome)
    }

    fn reset_onto_parent(&self, child: &mut Commit, parent_path: &BranchPath) -> BranchResult<()> {
        let own = own_content(child, child.timepoint())?;
        let mut by_kind: BTreeMap<DocKind, BTreeSet<String>> = BTreeMap::new();
        for document in &own {
            by_kind
                .entry(document.kind())
                .or_default()
                .insert(document.logical_id());
        }
        for (kind, ids) in &by_kind {
            child.delete(*kind, ids)?;
        }
        child.clear_replaced();

        let parent = self.find(parent_path)?;
        let mut pending = child.branch().clone();
        pending.base = parent.head;
        let inherited = self.lineage(&pending)?;
        child.rebase_onto(parent.head, inherited);
        Ok(())
    }

    /// Discard and recompute the semantic index of a branch
    pub fn rebuild(&self, path: &BranchPath) -> BranchResult<CommitOutcome> {
        info!(branch = %path, "rebuilding semantic index");
        self.with_commit(path, |commit| {
            commit.set_kind(CommitKind::Rebuild);
            Ok(())
        })
        .map(|(_, outcome)| outcome)
    }
}

/// Documents a commit's branch holds itself, live at `timepoint`
fn own_content(commit: &Commit, timepoint: Timepoint) -> BranchResult<Vec<Document>> {
    let own = BranchCriteria {
        path: commit.path().clone(),
        timepoint,
        replaced: BTreeMap::new(),
        inherited: Vec::new(),
    };
    Ok(commit
        .store()
        .query(&Visibility::Branch(own), &DocFilter::new())?
        .into_iter()
        .map(|v| v.document)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Concept;
    use crate::storage::{OpenStore, SqliteStore};

    fn manager() -> BranchManager {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        BranchManager::new(store, ListenerChain::empty(), 100).unwrap()
    }

    fn path(s: &str) -> BranchPath {
        BranchPath::new(s).unwrap()
    }

    fn concepts(manager: &BranchManager, branch: &str) -> Vec<String> {
        let vis = manager.visibility(&path(branch)).unwrap();
        manager
            .store()
            .query(&vis, &DocFilter::of_kind(DocKind::Concept))
            .unwrap()
            .into_iter()
            .map(|v| v.id())
            .collect()
    }

    #[test]
    fn test_create_requires_parent() {
        let manager = manager();
        assert!(matches!(
            manager.create(&path("MAIN/A")),
            Err(BranchError::ParentNotFound(_))
        ));
        manager.create(&path("MAIN")).unwrap();
        let child = manager.create(&path("MAIN/A")).unwrap();
        assert_eq!(child.base, manager.find(&path("MAIN")).unwrap().head);
        assert!(matches!(
            manager.create(&path("MAIN/A")),
            Err(BranchError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_commit_advances_head() {
        let manager = manager();
        let created = manager.create(&path("MAIN")).unwrap();

        let (_, outcome) = manager
            .with_commit(&path("MAIN"), |commit| {
                commit.save(vec![Concept::new("1").into()])?;
                Ok(())
            })
            .unwrap();

        assert!(outcome.committed);
        assert!(outcome.branch.head > created.head);
        assert!(!manager.find(&path("MAIN")).unwrap().locked);
        assert_eq!(concepts(&manager, "MAIN"), vec!["1"]);
        assert_eq!(manager.store().branch_versions(&path("MAIN")).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_commit_leaves_no_content() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();

        let commit = {
            let mut commit = manager.open_commit(&path("MAIN")).unwrap();
            commit.save(vec![Concept::new("1").into()]).unwrap();
            commit
        };
        let outcome = manager.close_commit(commit, false).unwrap();

        assert!(!outcome.committed);
        assert!(concepts(&manager, "MAIN").is_empty());
        assert!(!manager.find(&path("MAIN")).unwrap().locked);
    }

    #[test]
    fn test_open_commit_fails_fast_when_locked() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();
        let commit = manager.open_commit(&path("MAIN")).unwrap();

        assert!(matches!(
            manager.open_commit(&path("MAIN")),
            Err(BranchError::Locked(_))
        ));
        manager.close_commit(commit, true).unwrap();
        assert!(manager.open_commit(&path("MAIN")).is_ok());
    }

    #[test]
    fn test_child_inherits_until_it_overrides() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();
        manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("1").into()])?))
            .unwrap();
        manager.create(&path("MAIN/A")).unwrap();
        assert_eq!(concepts(&manager, "MAIN/A"), vec!["1"]);

        // Parent changes after the child's base stay invisible
        manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("2").into()])?))
            .unwrap();
        assert_eq!(concepts(&manager, "MAIN/A"), vec!["1"]);

        manager
            .with_commit(&path("MAIN/A"), |c| {
                c.delete(DocKind::Concept, &BTreeSet::from(["1".to_string()]))?;
                Ok(())
            })
            .unwrap();
        assert!(concepts(&manager, "MAIN/A").is_empty());
        assert_eq!(concepts(&manager, "MAIN"), vec!["1", "2"]);
    }

    #[test]
    fn test_rollback_latest_commit_only() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();
        let (_, first) = manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("1").into()])?))
            .unwrap();
        let (_, second) = manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("2").into()])?))
            .unwrap();

        assert!(matches!(
            manager.rollback_commit(&path("MAIN"), first.branch.head),
            Err(BranchError::NotLatestCommit { .. })
        ));

        let restored = manager.rollback_commit(&path("MAIN"), second.branch.head).unwrap();
        assert_eq!(restored.head, first.branch.head);
        assert_eq!(concepts(&manager, "MAIN"), vec!["1"]);
    }

    #[test]
    fn test_rollback_partial_commit() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();
        manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("1").into()])?))
            .unwrap();

        assert!(matches!(
            manager.rollback_partial_commit(&path("MAIN")),
            Err(BranchError::NotLocked(_))
        ));

        // A commit that never closes
        let mut crashed = manager.open_commit(&path("MAIN")).unwrap();
        crashed.save(vec![Concept::new("2").into()]).unwrap();
        drop(crashed);

        assert!(manager.find(&path("MAIN")).unwrap().locked);
        assert!(matches!(
            manager.open_commit(&path("MAIN")),
            Err(BranchError::PartialCommit(_))
        ));

        let recovered = manager.rollback_partial_commit(&path("MAIN")).unwrap();
        assert!(!recovered.locked);
        assert!(!manager.find(&path("MAIN")).unwrap().locked);
        assert_eq!(concepts(&manager, "MAIN"), vec!["1"]);
    }

    #[test]
    fn test_recover_commit_that_never_wrote() {
        let manager = manager();
        let created = manager.create(&path("MAIN")).unwrap();
        drop(manager.open_commit(&path("MAIN")).unwrap());

        let recovered = manager.rollback_partial_commit(&path("MAIN")).unwrap();
        assert!(!recovered.locked);
        assert_eq!(recovered.head, created.head);
        assert_eq!(manager.store().branch_versions(&path("MAIN")).unwrap().len(), 1);

        manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("1").into()])?))
            .unwrap();
        assert_eq!(concepts(&manager, "MAIN"), vec!["1"]);
    }

    #[test]
    fn test_rebase_moves_base() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();
        manager.create(&path("MAIN/A")).unwrap();
        manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("1").into()])?))
            .unwrap();
        assert!(concepts(&manager, "MAIN/A").is_empty());

        let outcome = manager.rebase(&path("MAIN/A")).unwrap();
        assert!(outcome.committed);
        assert_eq!(outcome.branch.base, manager.find(&path("MAIN")).unwrap().head);
        assert_eq!(concepts(&manager, "MAIN/A"), vec!["1"]);

        let again = manager.rebase(&path("MAIN/A")).unwrap();
        assert!(!again.committed);
    }

    #[test]
    fn test_promote_requires_up_to_date_child() {
        let manager = manager();
        manager.create(&path("MAIN")).unwrap();
        manager.create(&path("MAIN/A")).unwrap();
        manager
            .with_commit(&path("MAIN/A"), |c| Ok(c.save(vec![Concept::new("10").into()])?))
            .unwrap();
        manager
            .with_commit(&path("MAIN"), |c| Ok(c.save(vec![Concept::new("1").into()])?))
            .unwrap();

        assert!(matches!(
            manager.promote(&path("MAIN/A")),
            Err(BranchError::NotUpToDate(_))
        ));
        assert!(!manager.find(&path("MAIN/A")).unwrap().locked);

        manager.rebase(&path("MAIN/A")).unwrap();
        manager.promote(&path("MAIN/A")).unwrap();

        assert_eq!(concepts(&manager, "MAIN"), vec!["1", "10"]);
        assert_eq!(concepts(&manager, "MAIN/A"), vec!["1", "10"]);
        let child = manager.find(&path("MAIN/A")).unwrap();
        assert!(child.versions_replaced.is_empty());
        assert_eq!(child.base, manager.find(&path("MAIN")).unwrap().head);
    }
}
