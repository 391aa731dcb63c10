//! Semantic index entries: materialized closure of one concept

use super::concept::ConceptId;
use super::relationship::HierarchyKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The materialized ancestry of one concept in one hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Concept the entry describes
    pub concept_id: ConceptId,
    /// Hierarchy the closure was computed over
    pub hierarchy: HierarchyKind,
    /// Direct parents via active "is a" edges
    pub parents: BTreeSet<ConceptId>,
    /// Every concept reachable via one or more active "is a" edges
    pub ancestors: BTreeSet<ConceptId>,
    /// Non-hierarchy relationships: type id -> destination ids
    #[serde(default)]
    pub attributes: BTreeMap<ConceptId, BTreeSet<ConceptId>>,
}

impl IndexEntry {
    pub fn new(concept_id: ConceptId, hierarchy: HierarchyKind) -> Self {
        Self {
            concept_id,
            hierarchy,
            parents: BTreeSet::new(),
            ancestors: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Logical id of the entry for a concept, e.g. `138875005_s`
    pub fn logical_id(concept_id: &ConceptId, hierarchy: HierarchyKind) -> String {
        format!("{}_{}", concept_id, hierarchy.suffix())
    }

    pub fn id(&self) -> String {
        Self::logical_id(&self.concept_id, self.hierarchy)
    }

    /// Whether the entry has the given attribute, optionally with a specific value
    pub fn has_attribute(&self, attribute: &ConceptId, value: Option<&ConceptId>) -> bool {
        match (self.attributes.get(attribute), value) {
            (Some(values), Some(value)) => values.contains(value),
            (Some(values), None) => !values.is_empty(),
            (None, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_id_suffix() {
        let id = ConceptId::from("138875005");
        assert_eq!(IndexEntry::logical_id(&id, HierarchyKind::Stated), "138875005_s");
        assert_eq!(IndexEntry::logical_id(&id, HierarchyKind::Inferred), "138875005_i");
    }

    #[test]
    fn test_has_attribute() {
        let mut entry = IndexEntry::new(ConceptId::from("300000000"), HierarchyKind::Inferred);
        entry
            .attributes
            .entry(ConceptId::from("110000000"))
            .or_default()
            .insert(ConceptId::from("210000000"));

        let topping = ConceptId::from("110000000");
        assert!(entry.has_attribute(&topping, None));
        assert!(entry.has_attribute(&topping, Some(&ConceptId::from("210000000"))));
        assert!(!entry.has_attribute(&topping, Some(&ConceptId::from("220000000"))));
        assert!(!entry.has_attribute(&ConceptId::from("999"), None));
    }
}
