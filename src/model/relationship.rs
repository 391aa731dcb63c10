//! Relationships: directed, typed edges between concepts

use super::concept::{ConceptId, CORE_MODULE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type id of the subsumption ("is a") relationship
pub const IS_A: &str = "116680003";

/// Which of the two parallel hierarchies a relationship belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyKind {
    /// Author-asserted
    Stated,
    /// Classifier-derived
    Inferred,
}

impl HierarchyKind {
    pub const ALL: [HierarchyKind; 2] = [HierarchyKind::Stated, HierarchyKind::Inferred];

    /// Suffix used in index entry ids
    pub fn suffix(&self) -> &'static str {
        match self {
            HierarchyKind::Stated => "s",
            HierarchyKind::Inferred => "i",
        }
    }
}

impl std::fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HierarchyKind::Stated => write!(f, "stated"),
            HierarchyKind::Inferred => write!(f, "inferred"),
        }
    }
}

/// A directed relationship from a source concept to a destination concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier
    pub id: String,
    /// Concept the relationship belongs to
    pub source_id: ConceptId,
    /// Concept the relationship points at
    pub destination_id: ConceptId,
    /// Relationship type (e.g. [`IS_A`])
    pub type_id: ConceptId,
    /// Whether the relationship is in force
    pub active: bool,
    /// Stated or inferred
    pub hierarchy: HierarchyKind,
    /// Role group
    pub group: u32,
    /// Owning module
    pub module_id: String,
    /// Release date as yyyymmdd, unset for unpublished content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<u32>,
}

impl Relationship {
    /// Create a new active, stated relationship with a generated id
    ///
    /// The source is filled in by [`Concept::add_relationship`](super::Concept::add_relationship)
    /// or [`Relationship::from_source`].
    pub fn new(type_id: impl Into<ConceptId>, destination_id: impl Into<ConceptId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: ConceptId::from_string(""),
            destination_id: destination_id.into(),
            type_id: type_id.into(),
            active: true,
            hierarchy: HierarchyKind::Stated,
            group: 0,
            module_id: CORE_MODULE.to_string(),
            effective_time: None,
        }
    }

    /// Create a new stated "is a" relationship
    pub fn is_a(destination_id: impl Into<ConceptId>) -> Self {
        Self::new(IS_A, destination_id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn from_source(mut self, source_id: impl Into<ConceptId>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: HierarchyKind) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    /// Mark as classifier-derived
    pub fn inferred(self) -> Self {
        self.with_hierarchy(HierarchyKind::Inferred)
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = module_id.into();
        self
    }

    pub fn with_effective_time(mut self, effective_time: u32) -> Self {
        self.effective_time = Some(effective_time);
        self
    }

    /// Whether this is an edge of the subsumption hierarchy
    pub fn is_hierarchy_edge(&self, is_a: &ConceptId) -> bool {
        &self.type_id == is_a
    }
}
