//! Query types and result structures

use crate::model::ConceptId;

/// A structural predicate over concepts, evaluated against the semantic index
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every concept with an index entry
    Any,
    /// Ancestors of a concept, optionally including the concept itself
    AncestorOf { concept: ConceptId, or_self: bool },
    /// Descendants of a concept, optionally including the concept itself
    DescendantOf { concept: ConceptId, or_self: bool },
    /// Concepts with a relationship of the given type, to any destination
    /// or to a specific one
    AttributeEquals {
        attribute: ConceptId,
        value: Option<ConceptId>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn ancestor_of(concept: impl Into<ConceptId>) -> Self {
        Predicate::AncestorOf {
            concept: concept.into(),
            or_self: false,
        }
    }

    pub fn ancestor_or_self_of(concept: impl Into<ConceptId>) -> Self {
        Predicate::AncestorOf {
            concept: concept.into(),
            or_self: true,
        }
    }

    pub fn descendant_of(concept: impl Into<ConceptId>) -> Self {
        Predicate::DescendantOf {
            concept: concept.into(),
            or_self: false,
        }
    }

    pub fn descendant_or_self_of(concept: impl Into<ConceptId>) -> Self {
        Predicate::DescendantOf {
            concept: concept.into(),
            or_self: true,
        }
    }

    pub fn attribute(attribute: impl Into<ConceptId>, value: Option<ConceptId>) -> Self {
        Predicate::AttributeEquals {
            attribute: attribute.into(),
            value,
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

/// Which slice of a result to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Everything, in one page
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

/// One page of a sorted result
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole result
    pub total: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Cut a page out of an already sorted result
    pub fn slice(all: impl IntoIterator<Item = T>, request: PageRequest) -> Self {
        let all: Vec<T> = all.into_iter().collect();
        let total = all.len();
        let items = all.into_iter().skip(request.offset).take(request.limit).collect();
        Self { items, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slice() {
        let page = Page::slice(1..=10, PageRequest::new(8, 5));
        assert_eq!(page.items, vec![9, 10]);
        assert_eq!(page.total, 10);

        let page: Page<i32> = Page::slice(Vec::new(), PageRequest::default());
        assert_eq!(page, Page::empty());
    }
}
