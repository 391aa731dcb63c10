//! The closed set of documents kept in the versioned store

use super::concept::Concept;
use super::entry::IndexEntry;
use super::relationship::Relationship;
use serde::{Deserialize, Serialize};

/// Kind of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Concept,
    Relationship,
    IndexEntry,
}

impl DocKind {
    pub const ALL: [DocKind; 3] = [DocKind::Concept, DocKind::Relationship, DocKind::IndexEntry];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Concept => "concept",
            DocKind::Relationship => "relationship",
            DocKind::IndexEntry => "index_entry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for DocKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "doc_type", rename_all = "snake_case")]
pub enum Document {
    Concept(Concept),
    Relationship(Relationship),
    IndexEntry(IndexEntry),
}

impl Document {
    pub fn kind(&self) -> DocKind {
        match self {
            Document::Concept(_) => DocKind::Concept,
            Document::Relationship(_) => DocKind::Relationship,
            Document::IndexEntry(_) => DocKind::IndexEntry,
        }
    }

    /// Identity shared by every version of this document
    pub fn logical_id(&self) -> String {
        match self {
            Document::Concept(c) => c.id.to_string(),
            Document::Relationship(r) => r.id.clone(),
            Document::IndexEntry(e) => e.id(),
        }
    }

    /// Concept the document hangs off (relationship source for relationships)
    pub fn ref_id(&self) -> &str {
        match self {
            Document::Concept(c) => c.id.as_str(),
            Document::Relationship(r) => r.source_id.as_str(),
            Document::IndexEntry(e) => e.concept_id.as_str(),
        }
    }

    pub fn as_concept(&self) -> Option<&Concept> {
        match self {
            Document::Concept(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Document::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<&IndexEntry> {
        match self {
            Document::IndexEntry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Concept> for Document {
    fn from(c: Concept) -> Self {
        Document::Concept(c)
    }
}

impl From<Relationship> for Document {
    fn from(r: Relationship) -> Self {
        Document::Relationship(r)
    }
}

impl From<IndexEntry> for Document {
    fn from(e: IndexEntry) -> Self {
        Document::IndexEntry(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConceptId, HierarchyKind};

    #[test]
    fn test_document_tagging_roundtrip() {
        let doc = Document::from(Relationship::is_a("138875005").from_source("100002").with_id("r1"));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["doc_type"], "relationship");
        assert_eq!(json["source_id"], "100002");

        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_identity_by_kind() {
        let entry = IndexEntry::new(ConceptId::from("100002"), HierarchyKind::Inferred);
        let doc = Document::from(entry);
        assert_eq!(doc.kind(), DocKind::IndexEntry);
        assert_eq!(doc.logical_id(), "100002_i");
        assert_eq!(doc.ref_id(), "100002");
    }

    #[test]
    fn test_doc_kind_parse() {
        for kind in DocKind::ALL {
            assert_eq!(DocKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DocKind::parse("branch"), None);
    }
}
