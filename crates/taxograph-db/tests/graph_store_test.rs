//! PostgreSQL graph store integration tests.
//!
//! Require a migrated database at `DATABASE_URL` (see `test_fixtures`).
//! Every test uses unique ids so runs can share one database.

use taxograph_core::{
    Concept, ConceptFilter, ConceptKind, Error, GraphStore, GraphWriter, HierarchyRelation,
    MetricCount, ResourceRef, ResourceType, TagScope, TraversalDirection,
};
use taxograph_db::test_fixtures::{unique_id, TestDatabase};
use taxograph_db::GraphSeed;

struct Ids {
    weather: String,
    precipitation: String,
    rainfall: String,
    drought: String,
    d1: String,
    d2: String,
}

async fn test_database() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

async fn seeded(test_db: &TestDatabase) -> Ids {
    let ids = Ids {
        weather: unique_id("weather"),
        precipitation: unique_id("precipitation"),
        rainfall: unique_id("rainfall"),
        drought: unique_id("drought"),
        d1: unique_id("d1"),
        d2: unique_id("d2"),
    };
    let seed = GraphSeed::default()
        .concept(Concept::new(&ids.weather, "Weather").with_kinds([ConceptKind::Topic]))
        .concept(Concept::new(&ids.precipitation, "Precipitation"))
        .concept(Concept::new(&ids.rainfall, "Rainfall").with_synonyms(["rain"]))
        .concept(Concept::new(&ids.drought, "Drought").with_kinds([ConceptKind::Topic]))
        .relation(&ids.precipitation, &ids.weather, HierarchyRelation::PartOf)
        .relation(&ids.rainfall, &ids.precipitation, HierarchyRelation::IsA)
        .relation(&ids.drought, &ids.weather, HierarchyRelation::QualityOf)
        .dataset(&ids.d1, 3)
        .dataset(&ids.d2, 0)
        .tag(ResourceRef::dataset(&ids.d1), &ids.rainfall, "rw")
        .tag(ResourceRef::dataset(&ids.d2), &ids.drought, "rw");
    test_db
        .db
        .graph
        .load_seed(&seed)
        .await
        .expect("Failed to load seed");
    ids
}

#[tokio::test]
#[ignore]
async fn test_broader_walk_with_min_hops() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;

    let reached = test_db
        .db
        .graph
        .reachable_within_hops(
            std::slice::from_ref(&ids.rainfall),
            TraversalDirection::Broader,
            None,
        )
        .await
        .unwrap();

    let hops_of = |id: &str| reached.iter().find(|r| r.concept_id == id).map(|r| r.hops);
    assert_eq!(hops_of(&ids.precipitation), Some(1));
    assert_eq!(hops_of(&ids.weather), Some(2));
    assert_eq!(reached.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_narrower_walk_is_depth_bounded() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;

    let one_hop = test_db
        .db
        .graph
        .reachable_within_hops(
            std::slice::from_ref(&ids.weather),
            TraversalDirection::Narrower,
            Some(1),
        )
        .await
        .unwrap();
    let found: Vec<&str> = one_hop.iter().map(|r| r.concept_id.as_str()).collect();
    assert!(found.contains(&ids.precipitation.as_str()));
    assert!(found.contains(&ids.drought.as_str()));
    assert!(!found.contains(&ids.rainfall.as_str()));
}

#[tokio::test]
#[ignore]
async fn test_shared_ancestors_reported_once() {
    let test_db = test_database().await;
    let [a, b, p, q, r] = ["a", "b", "p", "q", "r"].map(unique_id);
    // a -> p, b -> p, p -> q -> r, plus a diamond p -> r and a cycle r -> p.
    let mut seed = GraphSeed::default();
    for id in [&a, &b, &p, &q, &r] {
        seed = seed.concept(Concept::new(id, id));
    }
    let seed = seed
        .relation(&a, &p, HierarchyRelation::IsA)
        .relation(&b, &p, HierarchyRelation::IsA)
        .relation(&p, &q, HierarchyRelation::IsA)
        .relation(&q, &r, HierarchyRelation::PartOf)
        .relation(&p, &r, HierarchyRelation::PartOf)
        .relation(&r, &p, HierarchyRelation::PartOf);
    test_db.db.graph.load_seed(&seed).await.unwrap();

    let reached = test_db
        .db
        .graph
        .reachable_within_hops(&[a.clone(), b.clone()], TraversalDirection::Broader, None)
        .await
        .unwrap();

    let mut found: Vec<(&str, u32)> = reached
        .iter()
        .map(|c| (c.concept_id.as_str(), c.hops))
        .collect();
    found.sort();
    let mut expected = vec![(p.as_str(), 1), (q.as_str(), 2), (r.as_str(), 2)];
    expected.sort();
    assert_eq!(found, expected);
}

#[tokio::test]
#[ignore]
async fn test_replace_tags_twice_is_stable() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;
    let d1 = ResourceRef::dataset(&ids.d1);
    let set = vec![ids.weather.clone(), ids.drought.clone()];

    test_db.db.graph.replace_tags(&d1, &set, "rw").await.unwrap();
    let first = test_db.db.graph.tagged_concepts(&d1, "rw").await.unwrap();
    test_db.db.graph.replace_tags(&d1, &set, "rw").await.unwrap();
    let second = test_db.db.graph.tagged_concepts(&d1, "rw").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_clear_tags_scopes() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;
    let d1 = ResourceRef::dataset(&ids.d1);
    let graph = &test_db.db.graph;

    graph
        .tag_resource(&d1, std::slice::from_ref(&ids.drought), "gfw")
        .await
        .unwrap();
    graph
        .clear_tags(&d1, &TagScope::Application("rw".to_string()))
        .await
        .unwrap();
    assert!(graph.tagged_concepts(&d1, "rw").await.unwrap().is_empty());
    assert_eq!(graph.tagged_concepts(&d1, "gfw").await.unwrap().len(), 1);

    graph.clear_tags(&d1, &TagScope::AllApplications).await.unwrap();
    assert!(graph.tagged_concepts(&d1, "gfw").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_unknown_concept_is_not_found() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;

    let err = test_db
        .db
        .graph
        .tag_resource(&ResourceRef::dataset(&ids.d1), &[unique_id("nope")], "rw")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn test_delete_dataset_cascades() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;
    let graph = &test_db.db.graph;
    let d1 = ResourceRef::dataset(&ids.d1);
    let widget = ResourceRef::new(ResourceType::Widget, unique_id("w"));
    let meta = ResourceRef::new(ResourceType::Metadata, unique_id("m"));

    graph.create_resource(&widget, Some(&d1)).await.unwrap();
    graph.create_resource(&meta, Some(&widget)).await.unwrap();
    graph.delete_resource(&d1).await.unwrap();

    assert!(!graph.resource_exists(&widget).await.unwrap());
    assert!(!graph.resource_exists(&meta).await.unwrap());
    assert!(graph
        .resources_tagged_with(std::slice::from_ref(&ids.rainfall), ResourceType::Dataset, "rw")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore]
async fn test_views_and_favourites() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;
    let graph = &test_db.db.graph;
    let user = unique_id("user");

    graph.record_view(&ids.d1, Some(user.as_str()), "rw").await.unwrap();
    graph
        .add_favourite(&user, &ResourceRef::dataset(&ids.d2), "rw")
        .await
        .unwrap();

    let candidates = vec![ids.d1.clone(), ids.d2.clone()];
    let views = graph.dataset_views(Some(candidates.as_slice())).await.unwrap();
    assert!(views.contains(&MetricCount::new(&ids.d1, 4)));

    let favs = graph
        .favourite_counts(Some("rw"), Some(candidates.as_slice()))
        .await
        .unwrap();
    assert!(favs.contains(&MetricCount::new(&ids.d1, 0)));
    assert!(favs.contains(&MetricCount::new(&ids.d2, 1)));

    assert_eq!(
        graph.user_dataset_views(&user, "rw").await.unwrap(),
        vec![MetricCount::new(&ids.d1, 1)]
    );
}

#[tokio::test]
#[ignore]
async fn test_list_concepts_filters_by_kind_and_label() {
    let test_db = test_database().await;
    let ids = seeded(&test_db).await;

    let filter = ConceptFilter::from_params(Some("TOPIC"), Some("drought"));
    let listed = test_db
        .db
        .graph
        .list_concepts("rw", &filter)
        .await
        .unwrap();
    let row = listed
        .iter()
        .find(|u| u.concept.id == ids.drought)
        .expect("drought listed");
    assert_eq!(row.datasets, vec![ids.d2.clone()]);
    assert!(listed.iter().all(|u| u.concept.id != ids.weather));
}
