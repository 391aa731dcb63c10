//! Concepts: the nodes of the terminology hierarchy

use super::relationship::Relationship;
use serde::{Deserialize, Serialize};

/// Module assigned to content when the caller does not name one
pub const CORE_MODULE: &str = "900000000000207008";

/// Identifier of a concept
///
/// Serializes as a plain string (e.g. "138875005")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(String);

impl ConceptId {
    /// Create a ConceptId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConceptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&ConceptId> for ConceptId {
    fn from(id: &ConceptId) -> Self {
        id.clone()
    }
}

/// A concept and the relationships it is the source of
///
/// Relationships are persisted as separate documents; the concept document
/// itself is stored without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Unique identifier
    pub id: ConceptId,
    /// Whether the concept is in use
    pub active: bool,
    /// Owning module
    pub module_id: String,
    /// Outgoing relationships (not part of the stored concept document)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl Concept {
    /// Create a new active concept in the core module
    pub fn new(id: impl Into<ConceptId>) -> Self {
        Self {
            id: id.into(),
            active: true,
            module_id: CORE_MODULE.to_string(),
            relationships: Vec::new(),
        }
    }

    /// Set the owning module
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = module_id.into();
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Add an outgoing relationship, taking ownership of its source
    pub fn add_relationship(mut self, mut relationship: Relationship) -> Self {
        relationship.source_id = self.id.clone();
        self.relationships.push(relationship);
        self
    }

    /// Relationships pointing at the given destination
    pub fn relationships_with_destination<'a>(
        &'a self,
        destination: &'a ConceptId,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships
            .iter()
            .filter(move |r| &r.destination_id == destination)
    }

    /// Mutable access to relationships pointing at the given destination
    pub fn relationships_with_destination_mut<'a>(
        &'a mut self,
        destination: &'a ConceptId,
    ) -> impl Iterator<Item = &'a mut Relationship> + 'a {
        self.relationships
            .iter_mut()
            .filter(move |r| &r.destination_id == destination)
    }

    /// The concept document as stored, without relationships
    pub(crate) fn without_relationships(&self) -> Concept {
        Concept {
            id: self.id.clone(),
            active: self.active,
            module_id: self.module_id.clone(),
            relationships: Vec::new(),
        }
    }
}
