//! Concept-level reads and writes on top of the document store
//!
//! A concept is stored as one concept document plus one document per
//! relationship. Saving a concept replaces its relationship set: visible
//! relationships of the concept that are not in the new set are deleted.

use crate::branch::Commit;
use crate::model::{Concept, ConceptId, DocKind, Document, Relationship};
use crate::storage::{DocFilter, DocumentStore, StorageResult, Visibility};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What a concept write changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptWrite {
    pub concepts: usize,
    pub relationships: usize,
    pub relationships_removed: usize,
}

/// Save concepts with their relationships, writing only what changed
pub fn save_concepts(
    commit: &mut Commit,
    concepts: impl IntoIterator<Item = Concept>,
) -> StorageResult<ConceptWrite> {
    let concepts: Vec<Concept> = concepts
        .into_iter()
        .map(|mut c| {
            for r in &mut c.relationships {
                r.source_id = c.id.clone();
            }
            c
        })
        .collect();
    if concepts.is_empty() {
        return Ok(ConceptWrite::default());
    }
    let ids: BTreeSet<String> = concepts.iter().map(|c| c.id.to_string()).collect();

    let existing: BTreeMap<String, Concept> = commit
        .query(&DocFilter::of_kind(DocKind::Concept).with_ids(ids.iter().cloned()))?
        .into_iter()
        .filter_map(|v| match v.document {
            Document::Concept(c) => Some((c.id.to_string(), c)),
            _ => None,
        })
        .collect();
    let existing_relationships: BTreeMap<String, Relationship> = commit
        .query(&DocFilter::of_kind(DocKind::Relationship).with_refs(ids.iter().cloned()))?
        .into_iter()
        .filter_map(|v| match v.document {
            Document::Relationship(r) => Some((r.id.clone(), r)),
            _ => None,
        })
        .collect();

    let mut changed_concepts = Vec::new();
    let mut changed_relationships = Vec::new();
    let mut kept: BTreeSet<String> = BTreeSet::new();
    for concept in concepts {
        for relationship in &concept.relationships {
            kept.insert(relationship.id.clone());
            if existing_relationships.get(&relationship.id) != Some(relationship) {
                changed_relationships.push(Document::from(relationship.clone()));
            }
        }
        let stored = concept.without_relationships();
        if existing.get(stored.id.as_str()) != Some(&stored) {
            changed_concepts.push(Document::from(stored));
        }
    }
    let dropped: BTreeSet<String> = existing_relationships
        .keys()
        .filter(|id| !kept.contains(*id))
        .cloned()
        .collect();

    let write = ConceptWrite {
        concepts: changed_concepts.len(),
        relationships: changed_relationships.len(),
        relationships_removed: dropped.len(),
    };
    commit.save(changed_concepts)?;
    commit.save(changed_relationships)?;
    commit.delete(DocKind::Relationship, &dropped)?;
    debug!(branch = %commit.path(), ?write, "saved concepts");
    Ok(write)
}

/// Remove concepts and every relationship they are the source of
pub fn delete_concepts(commit: &mut Commit, ids: &BTreeSet<ConceptId>) -> StorageResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let refs: BTreeSet<String> = ids.iter().map(|c| c.to_string()).collect();
    let relationships: BTreeSet<String> = commit
        .query(&DocFilter::of_kind(DocKind::Relationship).with_refs(refs.iter().cloned()))?
        .into_iter()
        .map(|v| v.id())
        .collect();
    commit.delete(DocKind::Relationship, &relationships)?;
    commit.delete(DocKind::Concept, &refs)
}

/// Load concepts with their visible relationships
pub fn find_concepts(
    store: &dyn DocumentStore,
    visibility: &Visibility,
    ids: &BTreeSet<ConceptId>,
) -> StorageResult<Vec<Concept>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let refs: Vec<String> = ids.iter().map(|c| c.to_string()).collect();

    let mut concepts: BTreeMap<ConceptId, Concept> = store
        .query(visibility, &DocFilter::of_kind(DocKind::Concept).with_ids(refs.iter().cloned()))?
        .into_iter()
        .filter_map(|v| match v.document {
            Document::Concept(c) => Some((c.id.clone(), c)),
            _ => None,
        })
        .collect();
    for version in store.query(visibility, &DocFilter::of_kind(DocKind::Relationship).with_refs(refs))? {
        if let Document::Relationship(r) = version.document {
            if let Some(concept) = concepts.get_mut(&r.source_id) {
                concept.relationships.push(r);
            }
        }
    }
    Ok(concepts.into_values().collect())
}

/// Load one concept with its visible relationships
pub fn find_concept(
    store: &dyn DocumentStore,
    visibility: &Visibility,
    id: &ConceptId,
) -> StorageResult<Option<Concept>> {
    let ids = BTreeSet::from([id.clone()]);
    Ok(find_concepts(store, visibility, &ids)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{BranchManager, BranchPath};
    use crate::listeners::ListenerChain;
    use crate::model::{Relationship, IS_A};
    use crate::storage::{OpenStore, SqliteStore};
    use std::sync::Arc;

    fn setup() -> (BranchManager, BranchPath) {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let manager = BranchManager::new(store, ListenerChain::empty(), 100).unwrap();
        let main = BranchPath::new("MAIN").unwrap();
        manager.create(&main).unwrap();
        (manager, main)
    }

    fn load(manager: &BranchManager, path: &BranchPath, id: &str) -> Option<Concept> {
        let visibility = manager.visibility(path).unwrap();
        find_concept(manager.store().as_ref(), &visibility, &ConceptId::from(id)).unwrap()
    }

    #[test]
    fn test_save_and_find_concept() {
        let (manager, main) = setup();
        let pizza = Concept::new("100")
            .add_relationship(Relationship::is_a("1").with_id("r1"))
            .add_relationship(Relationship::new("200", "300").with_id("r2"));

        let (write, _) = manager
            .with_commit(&main, |c| Ok(save_concepts(c, vec![pizza.clone()])?))
            .unwrap();
        assert_eq!(write.concepts, 1);
        assert_eq!(write.relationships, 2);

        let found = load(&manager, &main, "100").unwrap();
        assert_eq!(found.relationships.len(), 2);
        assert!(found.relationships.iter().all(|r| r.source_id.as_str() == "100"));
        assert_eq!(found.relationships[0].type_id.as_str(), IS_A);
    }

    #[test]
    fn test_unchanged_content_is_not_rewritten() {
        let (manager, main) = setup();
        let pizza = Concept::new("100").add_relationship(Relationship::is_a("1").with_id("r1"));
        manager
            .with_commit(&main, |c| Ok(save_concepts(c, vec![pizza.clone()])?))
            .unwrap();

        let (write, _) = manager
            .with_commit(&main, |c| Ok(save_concepts(c, vec![pizza.clone()])?))
            .unwrap();
        assert_eq!(write, ConceptWrite::default());
    }

    #[test]
    fn test_missing_relationships_are_removed() {
        let (manager, main) = setup();
        let pizza = Concept::new("100")
            .add_relationship(Relationship::is_a("1").with_id("r1"))
            .add_relationship(Relationship::is_a("2").with_id("r2"));
        manager
            .with_commit(&main, |c| Ok(save_concepts(c, vec![pizza])?))
            .unwrap();

        let trimmed = Concept::new("100").add_relationship(Relationship::is_a("1").with_id("r1"));
        let (write, _) = manager
            .with_commit(&main, |c| Ok(save_concepts(c, vec![trimmed])?))
            .unwrap();
        assert_eq!(write.relationships_removed, 1);

        let found = load(&manager, &main, "100").unwrap();
        assert_eq!(found.relationships.len(), 1);
        assert_eq!(found.relationships[0].id, "r1");
    }

    #[test]
    fn test_delete_concepts_takes_relationships() {
        let (manager, main) = setup();
        let pizza = Concept::new("100").add_relationship(Relationship::is_a("1").with_id("r1"));
        manager
            .with_commit(&main, |c| Ok(save_concepts(c, vec![pizza])?))
            .unwrap();

        let ids = BTreeSet::from([ConceptId::from("100")]);
        let (removed, _) = manager
            .with_commit(&main, |c| Ok(delete_concepts(c, &ids)?))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(load(&manager, &main, "100").is_none());

        let visibility = manager.visibility(&main).unwrap();
        let relationships = manager
            .store()
            .query(&visibility, &DocFilter::of_kind(DocKind::Relationship))
            .unwrap();
        assert!(relationships.is_empty());
    }
}
