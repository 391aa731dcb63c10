//! Branches: paths, versions, commits and their lifecycle

mod clock;
mod commit;
mod manager;
mod path;
mod version;

pub use clock::{Clock, Timepoint};
pub use commit::{Commit, CommitKind};
pub use manager::{BranchError, BranchManager, BranchResult, CommitOutcome};
pub use path::{BranchPath, InvalidPath};
pub use version::{Branch, ReplacedSet};
