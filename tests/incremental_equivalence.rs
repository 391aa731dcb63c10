//! Incrementally maintained closures match a full recomputation
//!
//! Random commit sequences over a hierarchy whose edges only point at
//! lower-numbered concepts, so no cycles arise. After each commit the
//! index is checked against a walk of the edges, and at the end against a
//! rebuild of the same branch.

mod common;

use common::{commit_concepts, concept, engine, entries, path, reachable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use termgraph::storage::{DocFilter, TypeMatch};
use termgraph::{ConceptId, DocKind, HierarchyKind, TermEngine, IS_A};

const CONCEPTS: usize = 30;

type Parents = BTreeMap<String, BTreeSet<String>>;

fn name(i: usize) -> String {
    format!("{}", 1000 + i)
}

fn random_parents(rng: &mut StdRng, i: usize) -> BTreeSet<String> {
    if i == 0 {
        return BTreeSet::new();
    }
    let count = rng.gen_range(0..=3.min(i));
    let mut candidates: Vec<usize> = (0..i).collect();
    candidates.shuffle(rng);
    candidates.into_iter().take(count.max(1)).map(name).collect()
}

fn commit(engine: &TermEngine, branch: &str, parents: &mut Parents, changes: Vec<(String, BTreeSet<String>)>) {
    let concepts = changes
        .iter()
        .map(|(id, p)| {
            let p: Vec<&str> = p.iter().map(String::as_str).collect();
            concept(id, &p)
        })
        .collect();
    commit_concepts(engine, branch, concepts).unwrap();
    for (id, p) in changes {
        parents.insert(id, p);
    }
}

fn random_changes(rng: &mut StdRng) -> Vec<(String, BTreeSet<String>)> {
    let touched = rng.gen_range(1..=4);
    (0..touched)
        .map(|_| {
            let i = rng.gen_range(1..CONCEPTS);
            let mut p = random_parents(rng, i);
            // Occasionally make a concept a root
            if rng.gen_bool(0.1) {
                p.clear();
            }
            (name(i), p)
        })
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .collect()
}

fn assert_matches_edges(engine: &TermEngine, branch: &str, parents: &Parents) {
    let stated = entries(engine, branch, HierarchyKind::Stated);
    assert_eq!(stated.len(), CONCEPTS, "one entry per concept on {branch}");
    for i in 0..CONCEPTS {
        let id = name(i);
        let entry = &stated[&ConceptId::from(id.as_str())];
        assert_eq!(
            entry.ancestors,
            reachable(parents, &id),
            "ancestors of {id} on {branch}"
        );
    }
}

/// Drop concepts without parents, which a relationship scan cannot see
fn without_roots(parents: &Parents) -> Parents {
    parents
        .iter()
        .filter(|(_, p)| !p.is_empty())
        .map(|(c, p)| (c.clone(), p.clone()))
        .collect()
}

/// Parent map from the active "is a" relationships a branch sees
fn visible_parents(engine: &TermEngine, branch: &str) -> Parents {
    let visibility = engine.branches().visibility(&path(branch)).unwrap();
    let filter = DocFilter::of_kind(DocKind::Relationship)
        .with_active(true)
        .with_type(TypeMatch::Is(ConceptId::from(IS_A)));
    let mut parents = Parents::new();
    for version in engine.store().query(&visibility, &filter).unwrap() {
        if let Some(r) = version.document.as_relationship() {
            parents
                .entry(r.source_id.to_string())
                .or_default()
                .insert(r.destination_id.to_string());
        }
    }
    parents
}

fn seed(engine: &TermEngine, rng: &mut StdRng) -> Parents {
    let mut parents = Parents::new();
    let initial = (0..CONCEPTS).map(|i| (name(i), random_parents(rng, i))).collect();
    commit(engine, "MAIN", &mut parents, initial);
    parents
}

#[test]
fn test_incremental_matches_reachability_and_rebuild() {
    for seed_value in [7_u64, 42, 2024] {
        let mut rng = StdRng::seed_from_u64(seed_value);
        let engine = engine();
        let mut parents = seed(&engine, &mut rng);
        assert_matches_edges(&engine, "MAIN", &parents);

        for _ in 0..15 {
            let changes = random_changes(&mut rng);
            commit(&engine, "MAIN", &mut parents, changes);
            assert_matches_edges(&engine, "MAIN", &parents);
        }

        let incremental = entries(&engine, "MAIN", HierarchyKind::Stated);
        engine.branches().rebuild(&path("MAIN")).unwrap();
        assert_eq!(entries(&engine, "MAIN", HierarchyKind::Stated), incremental);
    }
}

#[test]
fn test_rebase_matches_rebuild() {
    let mut rng = StdRng::seed_from_u64(99);
    let engine = engine();
    let mut main = seed(&engine, &mut rng);
    engine.branches().create(&path("MAIN/TASK")).unwrap();
    let mut task = main.clone();
    assert_eq!(visible_parents(&engine, "MAIN/TASK"), without_roots(&task));

    for round in 0..4 {
        for _ in 0..2 {
            let changes = random_changes(&mut rng);
            commit(&engine, "MAIN/TASK", &mut task, changes);
        }
        let changes = random_changes(&mut rng);
        commit(&engine, "MAIN", &mut main, changes);
        assert_matches_edges(&engine, "MAIN", &main);

        let outcome = engine.branches().rebase(&path("MAIN/TASK")).unwrap();
        assert!(outcome.committed, "round {round}");

        // The child sees the parent's relationships except those it
        // wrote or deleted itself
        task = visible_parents(&engine, "MAIN/TASK");
        assert_matches_edges(&engine, "MAIN/TASK", &task);

        let incremental = entries(&engine, "MAIN/TASK", HierarchyKind::Stated);
        engine.branches().rebuild(&path("MAIN/TASK")).unwrap();
        assert_eq!(entries(&engine, "MAIN/TASK", HierarchyKind::Stated), incremental);
    }
}
