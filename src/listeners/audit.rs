use super::{CommitListener, ListenerResult, AUDIT};
use crate::branch::Commit;
use crate::model::DocKind;
use tracing::info;

/// Logs one structured line per completed commit
#[derive(Debug, Clone, Default)]
pub struct AuditLog;

impl CommitListener for AuditLog {
    fn name(&self) -> &'static str {
        AUDIT
    }

    fn on_commit_complete(&self, commit: &mut Commit) -> ListenerResult<()> {
        let written = |kind| commit.written().get(&kind).copied().unwrap_or(0);
        info!(
            target: "termgraph::audit",
            branch = %commit.path(),
            timepoint = %commit.timepoint(),
            kind = commit.kind().name(),
            concepts = written(DocKind::Concept),
            relationships = written(DocKind::Relationship),
            index_entries = written(DocKind::IndexEntry),
            removed = commit.removed().len(),
            "commit"
        );
        Ok(())
    }
}
