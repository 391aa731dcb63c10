//! Subsumption and structural queries over the semantic index

mod common;

use common::{commit_concepts, concept, engine, ids, path};
use termgraph::{ConceptId, HierarchyKind, PageRequest, Predicate, Relationship, TermEngine};

const TOPPING: &str = "732943007";

/// food
/// ├── pizza
/// │   ├── cheese pizza (topping: cheese)
/// │   └── veggie pizza (topping: tomato)
/// │       └── margherita (topping: tomato, cheese)
/// └── bread
fn menu() -> TermEngine {
    let engine = engine();
    let topping = |source: &str, value: &str| {
        Relationship::new(TOPPING, value).with_id(format!("{}~{}", source, value))
    };
    commit_concepts(
        &engine,
        "MAIN",
        vec![
            concept("food", &[]),
            concept("pizza", &["food"]),
            concept("bread", &["food"]),
            concept("cheese-pizza", &["pizza"]).add_relationship(topping("cheese-pizza", "cheese")),
            concept("veggie-pizza", &["pizza"]).add_relationship(topping("veggie-pizza", "tomato")),
            concept("margherita", &["veggie-pizza"])
                .add_relationship(topping("margherita", "tomato"))
                .add_relationship(topping("margherita", "cheese")),
        ],
    )
    .unwrap();
    engine
}

fn search(engine: &TermEngine, predicate: Predicate) -> Vec<String> {
    engine
        .query()
        .search(&predicate, &path("MAIN"), HierarchyKind::Stated, PageRequest::all())
        .unwrap()
        .items
        .into_iter()
        .map(|c| c.to_string())
        .collect()
}

#[test]
fn test_parents_children_and_descendants() {
    let engine = menu();
    let query = engine.query();
    let main = path("MAIN");
    let stated = HierarchyKind::Stated;

    assert_eq!(
        query.find_parent_ids(&"margherita".into(), &main, stated).unwrap(),
        ids(&["veggie-pizza"])
    );
    assert_eq!(
        query.find_child_ids(&"pizza".into(), &main, stated).unwrap(),
        ids(&["cheese-pizza", "veggie-pizza"])
    );
    assert_eq!(
        query.find_descendant_ids(&"pizza".into(), &main, stated).unwrap(),
        ids(&["cheese-pizza", "veggie-pizza", "margherita"])
    );
    assert!(query
        .find_descendant_ids(&"bread".into(), &main, stated)
        .unwrap()
        .is_empty());
}

#[test]
fn test_ancestor_union() {
    let engine = menu();
    let union = engine
        .query()
        .find_ancestor_ids_as_union(
            &path("MAIN"),
            HierarchyKind::Stated,
            &ids(&["margherita", "bread", "unknown"]),
        )
        .unwrap();
    assert_eq!(union, ids(&["veggie-pizza", "pizza", "food"]));
}

#[test]
fn test_search_structural_predicates() {
    let engine = menu();

    assert_eq!(
        search(&engine, Predicate::descendant_or_self_of("veggie-pizza")),
        vec!["margherita", "veggie-pizza"]
    );
    assert_eq!(
        search(&engine, Predicate::ancestor_of("margherita")),
        vec!["food", "pizza", "veggie-pizza"]
    );
    assert_eq!(
        search(&engine, Predicate::ancestor_or_self_of("bread")),
        vec!["bread", "food"]
    );
    assert_eq!(
        search(&engine, Predicate::attribute(TOPPING, Some(ConceptId::from("cheese")))),
        vec!["cheese-pizza", "margherita"]
    );
    assert_eq!(
        search(
            &engine,
            Predicate::And(vec![
                Predicate::descendant_of("pizza"),
                Predicate::attribute(TOPPING, Some(ConceptId::from("tomato"))),
                Predicate::attribute(TOPPING, Some(ConceptId::from("cheese"))).negate(),
            ])
        ),
        vec!["veggie-pizza"]
    );
    assert_eq!(
        search(
            &engine,
            Predicate::Or(vec![
                Predicate::descendant_or_self_of("bread"),
                Predicate::ancestor_of("cheese-pizza"),
            ])
        ),
        vec!["bread", "food", "pizza"]
    );
    assert_eq!(
        search(&engine, Predicate::attribute(TOPPING, None).negate()),
        vec!["bread", "food", "pizza"]
    );
    assert_eq!(search(&engine, Predicate::Any).len(), 6);
}

#[test]
fn test_search_pages() {
    let engine = menu();
    let page = engine
        .query()
        .search(
            &Predicate::descendant_of("food"),
            &path("MAIN"),
            HierarchyKind::Stated,
            PageRequest::new(1, 2),
        )
        .unwrap();
    assert_eq!(page.total, 5);
    let items: Vec<&str> = page.items.iter().map(ConceptId::as_str).collect();
    assert_eq!(items, vec!["cheese-pizza", "margherita"]);
}

#[test]
fn test_search_sees_branch_content() {
    let engine = menu();
    engine.branches().create(&path("MAIN/DESSERT")).unwrap();
    commit_concepts(&engine, "MAIN/DESSERT", vec![concept("nutella-pizza", &["pizza"])]).unwrap();

    let on_child = engine
        .query()
        .search(
            &Predicate::descendant_of("pizza"),
            &path("MAIN/DESSERT"),
            HierarchyKind::Stated,
            PageRequest::all(),
        )
        .unwrap();
    assert_eq!(on_child.total, 4);
    assert_eq!(search(&engine, Predicate::descendant_of("pizza")).len(), 3);
}
