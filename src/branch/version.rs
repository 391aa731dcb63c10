//! Branch version records

use super::clock::Timepoint;
use super::path::BranchPath;
use crate::model::DocKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Logical ids per document kind
pub type ReplacedSet = BTreeMap<DocKind, BTreeSet<String>>;

/// One version of a branch's state
///
/// Every state change (creation, commit, rebase) writes a new version and
/// end-dates the previous one, so the state of a branch at any timepoint
/// can be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub path: BranchPath,
    /// When the branch was created
    pub creation: Timepoint,
    /// When this version came into force
    pub start: Timepoint,
    /// When this version was superseded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Timepoint>,
    /// Parent head this branch is based on
    pub base: Timepoint,
    /// Timepoint of the last completed commit
    pub head: Timepoint,
    /// Held from commit open to commit close
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Inherited document ids superseded on this branch
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub versions_replaced: ReplacedSet,
}

impl Branch {
    /// A first version created at `timepoint` on top of the given base
    pub fn new(path: BranchPath, base: Timepoint, timepoint: Timepoint) -> Self {
        Self {
            path,
            creation: timepoint,
            start: timepoint,
            end: None,
            base,
            head: timepoint,
            locked: false,
            metadata: BTreeMap::new(),
            versions_replaced: BTreeMap::new(),
        }
    }

    pub fn is_replaced(&self, kind: DocKind, id: &str) -> bool {
        self.versions_replaced
            .get(&kind)
            .is_some_and(|ids| ids.contains(id))
    }

    pub fn mark_replaced(&mut self, kind: DocKind, ids: impl IntoIterator<Item = String>) {
        self.versions_replaced.entry(kind).or_default().extend(ids);
    }

    /// Whether parent content newer than the base exists
    pub fn is_behind(&self, parent: &Branch) -> bool {
        parent.head > self.base
    }

    /// The version that follows this one, starting (and heading) at `start`
    pub fn next_version(&self, start: Timepoint) -> Branch {
        Branch {
            start,
            end: None,
            head: start,
            locked: false,
            ..self.clone()
        }
    }

    /// Whether this version was in force at `timepoint`
    pub fn in_force_at(&self, timepoint: Timepoint) -> bool {
        self.start <= timepoint && self.end.map_or(true, |end| end > timepoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(ms: i64) -> Timepoint {
        Timepoint::from_millis(ms)
    }

    #[test]
    fn test_next_version_keeps_base_and_metadata() {
        let mut branch = Branch::new(BranchPath::new("MAIN/A").unwrap(), tp(5), tp(10));
        branch.metadata.insert("owner".into(), "team".into());
        branch.locked = true;

        let next = branch.next_version(tp(20));
        assert_eq!(next.start, tp(20));
        assert_eq!(next.head, tp(20));
        assert_eq!(next.base, tp(5));
        assert_eq!(next.creation, tp(10));
        assert!(!next.locked);
        assert_eq!(next.metadata.get("owner").map(String::as_str), Some("team"));
    }

    #[test]
    fn test_in_force_at() {
        let mut branch = Branch::new(BranchPath::new("MAIN").unwrap(), tp(10), tp(10));
        assert!(!branch.in_force_at(tp(9)));
        assert!(branch.in_force_at(tp(10)));
        assert!(branch.in_force_at(tp(1_000)));

        branch.end = Some(tp(20));
        assert!(branch.in_force_at(tp(19)));
        assert!(!branch.in_force_at(tp(20)));
    }

    #[test]
    fn test_replaced_ids() {
        let mut branch = Branch::new(BranchPath::new("MAIN/A").unwrap(), tp(1), tp(2));
        branch.mark_replaced(DocKind::Relationship, vec!["r1".to_string()]);
        assert!(branch.is_replaced(DocKind::Relationship, "r1"));
        assert!(!branch.is_replaced(DocKind::Concept, "r1"));
    }
}
