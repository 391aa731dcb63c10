//! Incremental transitive closure over "is a" edges
//!
//! The builder recomputes parents and ancestors for the concepts a change
//! touches, then widens to every existing descendant of a concept whose
//! closure moved, found through the current index rather than by walking
//! edges. Settling is a worklist in ancestor-before-descendant order that
//! requeues a concept whenever one of its parents changes after it was
//! processed.

use crate::branch::BranchPath;
use crate::model::ConceptId;
use crate::storage::{StorageError, StorageResult};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while computing closures
#[derive(Debug, Error)]
pub enum GraphBuilderError {
    #[error(
        "Loop found in transitive closure for concept {concept} on branch {branch}. \
         The concept {concept} is in its own set of ancestors: [{}]",
        join_ids(.ancestors)
    )]
    Loop {
        concept: ConceptId,
        branch: BranchPath,
        ancestors: BTreeSet<ConceptId>,
    },

    #[error("Transitive closure did not settle after {passes} passes (last concept {concept})")]
    NonConvergent { concept: ConceptId, passes: usize },

    #[error("Failed to read hierarchy: {0}")]
    Source(#[from] StorageError),
}

/// Result type for closure computation
pub type GraphBuilderResult<T> = Result<T, GraphBuilderError>;

fn join_ids(ids: &BTreeSet<ConceptId>) -> String {
    ids.iter().map(ConceptId::as_str).collect::<Vec<_>>().join(", ")
}

/// How cycles are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureMode {
    /// A concept in its own ancestor set aborts the computation
    Strict,
    /// Cycles are tolerated: the concept is left out of its own ancestors
    /// and reported
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChangeKind {
    Added,
    Removed,
}

/// An "is a" edge that appeared or went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeChange {
    pub source: ConceptId,
    pub destination: ConceptId,
    pub kind: EdgeChangeKind,
}

impl EdgeChange {
    pub fn added(source: impl Into<ConceptId>, destination: impl Into<ConceptId>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind: EdgeChangeKind::Added,
        }
    }

    pub fn removed(source: impl Into<ConceptId>, destination: impl Into<ConceptId>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind: EdgeChangeKind::Removed,
        }
    }
}

/// Direct parents and full ancestor set of one concept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    pub parents: BTreeSet<ConceptId>,
    pub ancestors: BTreeSet<ConceptId>,
}

/// Read access to a hierarchy and its current index
pub trait HierarchySource {
    /// Direct parents via active edges; concepts without any are omitted
    fn active_parents(
        &self,
        concepts: &BTreeSet<ConceptId>,
    ) -> StorageResult<BTreeMap<ConceptId, BTreeSet<ConceptId>>>;

    /// Closures currently materialized in the index
    fn existing_closures(
        &self,
        concepts: &BTreeSet<ConceptId>,
    ) -> StorageResult<BTreeMap<ConceptId, Closure>>;

    /// Concepts whose materialized ancestors include any of these
    fn existing_descendants(&self, concepts: &BTreeSet<ConceptId>) -> StorageResult<BTreeSet<ConceptId>>;
}

/// What changed
#[derive(Debug, Clone, Default)]
pub struct ClosureRequest {
    pub edges: Vec<EdgeChange>,
    /// Concepts to recompute even without edge changes
    pub concepts: BTreeSet<ConceptId>,
    /// Revisit every existing descendant of the seeds up front, not only
    /// those of concepts found to have changed
    pub revisit_descendants: bool,
}

/// Recomputed closures
#[derive(Debug, Clone, Default)]
pub struct ClosureUpdate {
    /// New closure of every concept that was recomputed
    pub closures: BTreeMap<ConceptId, Closure>,
    /// Index content for those concepts before the update
    pub previous: BTreeMap<ConceptId, Closure>,
    /// Concepts whose closure differs from the index
    pub dirty: BTreeSet<ConceptId>,
    /// Concepts found in their own ancestor set (lenient mode)
    pub cycles: BTreeSet<ConceptId>,
    /// Worklist iterations
    pub passes: usize,
}

/// Computes closures for one hierarchy on one branch
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    branch: BranchPath,
    mode: ClosureMode,
    max_passes: usize,
}

impl GraphBuilder {
    pub fn new(branch: BranchPath, mode: ClosureMode) -> Self {
        Self {
            branch,
            mode,
            max_passes: 10,
        }
    }

    /// Bound on worklist iterations, as a multiple of the concepts involved
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    pub fn mode(&self) -> ClosureMode {
        self.mode
    }

    /// Bring the closures touched by a change up to date
    pub fn update(
        &self,
        source: &dyn HierarchySource,
        request: &ClosureRequest,
    ) -> GraphBuilderResult<ClosureUpdate> {
        let (added, removed): (Vec<&EdgeChange>, Vec<&EdgeChange>) = request
            .edges
            .iter()
            .partition(|e| e.kind == EdgeChangeKind::Added);
        debug!(
            branch = %self.branch,
            added = added.len(),
            removed = removed.len(),
            concepts = request.concepts.len(),
            "updating transitive closure"
        );

        let mut seeds: BTreeSet<ConceptId> = request.concepts.clone();
        seeds.extend(request.edges.iter().map(|e| e.source.clone()));
        if seeds.is_empty() {
            return Ok(ClosureUpdate::default());
        }

        let mut pending = seeds.clone();
        if request.revisit_descendants {
            pending.extend(source.existing_descendants(&seeds)?);
        }

        let mut members: BTreeSet<ConceptId> = BTreeSet::new();
        let mut parents: BTreeMap<ConceptId, BTreeSet<ConceptId>> = BTreeMap::new();
        let mut previous: BTreeMap<ConceptId, Closure> = BTreeMap::new();
        let mut fixed: BTreeMap<ConceptId, Closure> = BTreeMap::new();
        let mut expanded: BTreeSet<ConceptId> = BTreeSet::new();
        let mut passes = 0;

        loop {
            self.admit(source, pending, &mut members, &mut parents, &mut previous, &mut fixed)?;

            let settled = self.settle(&members, &parents, &fixed)?;
            passes += settled.passes;

            let dirty: BTreeSet<ConceptId> = members
                .iter()
                .filter(|c| settled.ancestors.get(*c) != previous.get(*c).map(|p| &p.ancestors))
                .cloned()
                .collect();
            let newly_dirty: BTreeSet<ConceptId> = dirty.difference(&expanded).cloned().collect();
            expanded.extend(newly_dirty.iter().cloned());

            pending = if newly_dirty.is_empty() {
                BTreeSet::new()
            } else {
                source
                    .existing_descendants(&newly_dirty)?
                    .into_iter()
                    .filter(|c| !members.contains(c))
                    .collect()
            };

            if pending.is_empty() {
                let closures = members
                    .iter()
                    .map(|c| {
                        let closure = Closure {
                            parents: parents.get(c).cloned().unwrap_or_default(),
                            ancestors: settled.ancestors.get(c).cloned().unwrap_or_default(),
                        };
                        (c.clone(), closure)
                    })
                    .collect::<BTreeMap<_, _>>();
                let dirty = closures
                    .iter()
                    .filter(|(c, closure)| previous.get(*c) != Some(*closure))
                    .map(|(c, _)| c.clone())
                    .collect();
                debug!(
                    branch = %self.branch,
                    recomputed = closures.len(),
                    passes,
                    "transitive closure settled"
                );
                return Ok(ClosureUpdate {
                    closures,
                    previous,
                    dirty,
                    cycles: settled.cycles,
                    passes,
                });
            }
            debug!(branch = %self.branch, descendants = pending.len(), "revisiting descendants");
        }
    }

    /// Closures for a whole hierarchy from its parent map
    pub fn full(&self, parents: &BTreeMap<ConceptId, BTreeSet<ConceptId>>) -> GraphBuilderResult<ClosureUpdate> {
        let mut members: BTreeSet<ConceptId> = parents.keys().cloned().collect();
        members.extend(parents.values().flatten().cloned());

        let settled = self.settle(&members, parents, &BTreeMap::new())?;
        let closures: BTreeMap<ConceptId, Closure> = members
            .iter()
            .map(|c| {
                let closure = Closure {
                    parents: parents.get(c).cloned().unwrap_or_default(),
                    ancestors: settled.ancestors.get(c).cloned().unwrap_or_default(),
                };
                (c.clone(), closure)
            })
            .collect();
        Ok(ClosureUpdate {
            dirty: closures.keys().cloned().collect(),
            closures,
            previous: BTreeMap::new(),
            cycles: settled.cycles,
            passes: settled.passes,
        })
    }

    /// Load parents and index state for new members
    ///
    /// A parent outside the member set is taken as fixed at its indexed
    /// closure. A parent with parents of its own but nothing indexed has to
    /// be computed, so it joins the members.
    fn admit(
        &self,
        source: &dyn HierarchySource,
        mut pending: BTreeSet<ConceptId>,
        members: &mut BTreeSet<ConceptId>,
        parents: &mut BTreeMap<ConceptId, BTreeSet<ConceptId>>,
        previous: &mut BTreeMap<ConceptId, Closure>,
        fixed: &mut BTreeMap<ConceptId, Closure>,
    ) -> GraphBuilderResult<()> {
        while !pending.is_empty() {
            for concept in &pending {
                fixed.remove(concept);
            }
            parents.extend(source.active_parents(&pending)?);
            previous.extend(source.existing_closures(&pending)?);
            members.extend(pending.iter().cloned());

            let outside: BTreeSet<ConceptId> = pending
                .iter()
                .filter_map(|c| parents.get(c))
                .flatten()
                .filter(|p| !members.contains(*p) && !fixed.contains_key(*p))
                .cloned()
                .collect();
            if outside.is_empty() {
                break;
            }

            let indexed = source.existing_closures(&outside)?;
            let outside_parents = source.active_parents(&outside)?;
            pending = BTreeSet::new();
            for concept in outside {
                match indexed.get(&concept) {
                    Some(closure) => {
                        fixed.insert(concept, closure.clone());
                    }
                    None if outside_parents.contains_key(&concept) => {
                        pending.insert(concept);
                    }
                    None => {
                        fixed.insert(concept, Closure::default());
                    }
                }
            }
        }
        Ok(())
    }

    /// Settle ancestor sets for `members` given fixed closures outside it
    fn settle(
        &self,
        members: &BTreeSet<ConceptId>,
        parents: &BTreeMap<ConceptId, BTreeSet<ConceptId>>,
        fixed: &BTreeMap<ConceptId, Closure>,
    ) -> GraphBuilderResult<Settled> {
        let empty = BTreeSet::new();
        let parents_of = |c: &ConceptId| parents.get(c).unwrap_or(&empty);

        let mut children: BTreeMap<&ConceptId, Vec<&ConceptId>> = BTreeMap::new();
        let mut pending_parents: BTreeMap<&ConceptId, usize> = BTreeMap::new();
        for concept in members {
            let inner: Vec<&ConceptId> = parents_of(concept)
                .iter()
                .filter(|p| members.contains(*p))
                .collect();
            pending_parents.insert(concept, inner.len());
            for parent in inner {
                children.entry(parent).or_default().push(concept);
            }
        }

        // Kahn order; members on a cycle never reach zero and go last
        let mut order: Vec<&ConceptId> = Vec::with_capacity(members.len());
        let mut ready: VecDeque<&ConceptId> = pending_parents
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(c, _)| *c)
            .collect();
        while let Some(concept) = ready.pop_front() {
            order.push(concept);
            for child in children.get(concept).into_iter().flatten() {
                if let Some(n) = pending_parents.get_mut(child) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push_back(*child);
                    }
                }
            }
        }
        let cyclic = members.len() - order.len();
        if cyclic > 0 {
            let placed: BTreeSet<&ConceptId> = order.iter().copied().collect();
            order.extend(members.iter().filter(|c| !placed.contains(c)));
        }

        let limit = self.max_passes * members.len().max(1) * (cyclic + 1);
        let mut ancestors: BTreeMap<ConceptId, BTreeSet<ConceptId>> =
            members.iter().map(|c| (c.clone(), BTreeSet::new())).collect();
        let mut queue: VecDeque<&ConceptId> = order.into_iter().collect();
        let mut queued: BTreeSet<&ConceptId> = queue.iter().copied().collect();
        let mut cycles = BTreeSet::new();
        let mut passes = 0;

        while let Some(concept) = queue.pop_front() {
            queued.remove(concept);
            passes += 1;
            if passes > limit {
                return Err(GraphBuilderError::NonConvergent {
                    concept: concept.clone(),
                    passes,
                });
            }

            let mut computed = BTreeSet::new();
            for parent in parents_of(concept) {
                computed.insert(parent.clone());
                let inherited = match ancestors.get(parent) {
                    Some(set) => set,
                    None => fixed.get(parent).map_or(&empty, |c| &c.ancestors),
                };
                computed.extend(inherited.iter().cloned());
            }

            if computed.contains(concept) {
                match self.mode {
                    ClosureMode::Strict => {
                        return Err(GraphBuilderError::Loop {
                            concept: concept.clone(),
                            branch: self.branch.clone(),
                            ancestors: computed,
                        });
                    }
                    ClosureMode::Lenient => {
                        computed.remove(concept);
                        cycles.insert(concept.clone());
                    }
                }
            }

            if ancestors.get(concept) != Some(&computed) {
                ancestors.insert(concept.clone(), computed);
                for child in children.get(concept).into_iter().flatten() {
                    if queued.insert(*child) {
                        queue.push_back(*child);
                    }
                }
            }
        }

        Ok(Settled {
            ancestors,
            cycles,
            passes,
        })
    }
}

struct Settled {
    ancestors: BTreeMap<ConceptId, BTreeSet<ConceptId>>,
    cycles: BTreeSet<ConceptId>,
    passes: usize,
}
