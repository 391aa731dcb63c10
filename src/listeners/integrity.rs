//! Flags branches whose new relationships point at concepts they cannot see

use super::{CommitListener, ListenerResult, INTEGRITY};
use crate::branch::{Commit, CommitKind};
use crate::model::{ConceptId, DocKind};
use crate::storage::{DocFilter, Versioned};
use std::collections::BTreeSet;
use tracing::warn;

/// Branch metadata key set while the branch has dangling relationships
///
/// Set by any commit writing one; cleared once a later commit finds none
/// left among the relationships the branch sees.
pub const INTEGRITY_ISSUE: &str = "integrity_issue";

/// Checks both ends of every active relationship a commit wrote
#[derive(Debug, Clone, Default)]
pub struct IntegrityCheck;

impl CommitListener for IntegrityCheck {
    fn name(&self) -> &'static str {
        INTEGRITY
    }

    fn on_commit_complete(&self, commit: &mut Commit) -> ListenerResult<()> {
        if !matches!(commit.kind(), CommitKind::Content | CommitKind::Promotion { .. }) {
            return Ok(());
        }

        let timepoint = commit.timepoint();
        let active = DocFilter::of_kind(DocKind::Relationship).with_active(true);
        let written: Vec<Versioned> = commit
            .changes(&active)?
            .into_iter()
            .filter(|v| v.start == timepoint)
            .collect();
        let mut missing = missing_ends(commit, &written)?;

        // A clean commit clears the flag only once nothing dangles anywhere
        if missing.is_empty() && commit.branch().metadata.contains_key(INTEGRITY_ISSUE) {
            let visible = commit.query(&active)?;
            missing = missing_ends(commit, &visible)?;
        }

        if missing.is_empty() {
            commit.metadata_mut().remove(INTEGRITY_ISSUE);
        } else {
            warn!(
                branch = %commit.path(),
                concepts = ?missing,
                "relationships point at missing or inactive concepts"
            );
            commit
                .metadata_mut()
                .insert(INTEGRITY_ISSUE.to_string(), "true".to_string());
        }
        Ok(())
    }
}

/// Ends of the given relationships that are not visible active concepts
fn missing_ends(commit: &Commit, relationships: &[Versioned]) -> ListenerResult<BTreeSet<ConceptId>> {
    let mut missing: BTreeSet<ConceptId> = relationships
        .iter()
        .filter_map(|v| v.document.as_relationship())
        .flat_map(|r| [r.source_id.clone(), r.destination_id.clone()])
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    let filter = DocFilter::of_kind(DocKind::Concept)
        .with_ids(missing.iter().map(|c| c.as_str().to_string()))
        .with_active(true);
    for version in commit.query(&filter)? {
        if let Some(c) = version.document.as_concept() {
            missing.remove(&c.id);
        }
    }
    Ok(missing)
}
