//! Slash-delimited branch paths (`MAIN`, `MAIN/PROJECT`, `MAIN/PROJECT/TASK-1`)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a branch path was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid branch path '{path}': {reason}")]
pub struct InvalidPath {
    pub path: String,
    pub reason: &'static str,
}

/// A validated branch path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchPath(String);

impl BranchPath {
    /// Create a validated branch path
    ///
    /// Segments must be non-empty and contain only ASCII letters, digits,
    /// `-`, `_` or `.`.
    pub fn new(path: impl Into<String>) -> Result<Self, InvalidPath> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> Result<(), InvalidPath> {
        let fail = |reason| {
            Err(InvalidPath {
                path: path.to_string(),
                reason,
            })
        };

        if path.is_empty() {
            return fail("path cannot be empty");
        }
        for segment in path.split('/') {
            if segment.is_empty() {
                return fail("path segments cannot be empty");
            }
            if segment.starts_with('.') {
                return fail("path segments cannot start with '.'");
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return fail("path segments may only contain letters, digits, '-', '_' and '.'");
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The parent branch path, `None` for a root branch
    pub fn parent(&self) -> Option<BranchPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| BranchPath(parent.to_string()))
    }

    pub fn is_root(&self) -> bool {
        !self.0.contains('/')
    }

    /// All ancestor paths, nearest first
    ///
    /// `MAIN/ONE/ONE-123` gives `[MAIN/ONE, MAIN]`.
    pub fn ancestors(&self) -> Vec<BranchPath> {
        let mut result = Vec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            result.push(path);
        }
        result
    }

    /// Path of a direct child
    pub fn child(&self, name: &str) -> Result<BranchPath, InvalidPath> {
        BranchPath::new(format!("{}/{}", self.0, name))
    }
}

impl std::fmt::Display for BranchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BranchPath {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BranchPath::new(s)
    }
}
