//! End-to-end pipeline tests over the in-memory store.

use std::sync::Arc;

use taxograph_core::{
    Concept, ConceptKind, GraphStore, GraphWriter, HierarchyRelation, MetricCount, ResourceRef,
    GRAPH_DATASET,
};
use taxograph_db::{GraphSeed, InMemoryGraphStore};
use taxograph_search::{
    AncestorClosure, EngineConfig, GraphQueryEngine, QueryParams, ResultReconciler, RetryPolicy,
    SimilarityMode, StaticDirectory,
};

fn topic(id: &str) -> Concept {
    Concept::new(id, id).with_kinds([ConceptKind::Topic])
}

/// water <- river; drought <- agricultural_drought <- soil_moisture_deficit
fn hydrology_seed() -> GraphSeed {
    GraphSeed::default()
        .concept(topic("water"))
        .concept(topic("river"))
        .concept(topic("drought"))
        .concept(topic("agricultural_drought"))
        .concept(topic("soil_moisture_deficit"))
        .relation("river", "water", HierarchyRelation::IsA)
        .relation("agricultural_drought", "drought", HierarchyRelation::IsA)
        .relation(
            "soil_moisture_deficit",
            "agricultural_drought",
            HierarchyRelation::PartOf,
        )
        .dataset("both", 5)
        .dataset("water-only", 40)
        .dataset("river-drought", 12)
        .dataset("other-tenant", 99)
        .tag(ResourceRef::dataset("both"), "water", "rw")
        .tag(ResourceRef::dataset("both"), "soil_moisture_deficit", "rw")
        .tag(ResourceRef::dataset("water-only"), "water", "rw")
        .tag(ResourceRef::dataset("river-drought"), "river", "rw")
        .tag(ResourceRef::dataset("river-drought"), "drought", "rw")
        .tag(ResourceRef::dataset("other-tenant"), "water", "gfw")
        .tag(ResourceRef::dataset("other-tenant"), "drought", "gfw")
}

fn engine(
    seed: &GraphSeed,
    directory: StaticDirectory,
) -> (Arc<InMemoryGraphStore>, GraphQueryEngine) {
    let store = Arc::new(InMemoryGraphStore::from_seed(seed).expect("seed loads"));
    let config = EngineConfig::default().with_retry(RetryPolicy::no_retry());
    let engine = GraphQueryEngine::with_store(store.clone(), Arc::new(directory), config);
    (store, engine)
}

fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_water_and_drought_includes_descendant_matches() {
    let (_, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    let params = QueryParams::default().application("rw").depth(15);
    let out = engine
        .search_dataset_ids(&[strings(&["water"]), strings(&["drought"])], &params)
        .await
        .unwrap();

    assert!(out.data.contains(&"both".to_string()));
    assert!(out.data.contains(&"river-drought".to_string()));
    assert!(!out.data.contains(&"water-only".to_string()));
    assert!(!out.data.contains(&"other-tenant".to_string()));
    assert_eq!(out.cache, GRAPH_DATASET);
}

#[tokio::test]
async fn test_depth_zero_is_intersection_of_direct_tags() {
    let (store, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    let params = QueryParams::default().depth(0);
    let out = engine
        .search_dataset_ids(&[strings(&["water", "river"]), strings(&["drought"])], &params)
        .await
        .unwrap();
    assert_eq!(out.data, strings(&["river-drought"]));

    let closure = AncestorClosure::new(store.as_ref());
    assert!(closure
        .closure_within_depth(&strings(&["soil_moisture_deficit"]), 0)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_depth_bounds_descendant_matching() {
    let (_, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    // soil_moisture_deficit is two hops below drought.
    let one = engine
        .search_dataset_ids(&[strings(&["drought"])], &QueryParams::default().depth(1))
        .await
        .unwrap();
    assert_eq!(one.data, strings(&["river-drought"]));

    let two = engine
        .search_dataset_ids(&[strings(&["drought"])], &QueryParams::default().depth(2))
        .await
        .unwrap();
    assert_eq!(two.data, strings(&["both", "river-drought"]));
}

#[tokio::test]
async fn test_catalog_hides_deleted_datasets() {
    let (_, engine) = engine(
        &hydrology_seed(),
        StaticDirectory::with_visible(["river-drought"]),
    );
    let out = engine
        .search_dataset_ids(&[strings(&["water"]), strings(&["drought"])], &QueryParams::default())
        .await
        .unwrap();
    assert_eq!(out.data, strings(&["river-drought"]));
}

#[tokio::test]
async fn test_most_liked_counts_favourites_per_application() {
    let seed = hydrology_seed()
        .favourite("alice", ResourceRef::dataset("both"), "rw")
        .favourite("bob", ResourceRef::dataset("both"), "rw")
        .favourite("alice", ResourceRef::dataset("water-only"), "rw")
        .favourite("carol", ResourceRef::dataset("river-drought"), "gfw");
    let (_, engine) = engine(&seed, StaticDirectory::allow_all());

    let out = engine
        .most_liked_datasets(&QueryParams::default().application("rw"))
        .await
        .unwrap();
    assert_eq!(
        out.data,
        vec![MetricCount::new("both", 2), MetricCount::new("water-only", 1)]
    );
}

#[tokio::test]
async fn test_similarity_default_limit_is_three() {
    let mut seed = GraphSeed::default()
        .concept(topic("forest"))
        .dataset("seed", 0)
        .tag(ResourceRef::dataset("seed"), "forest", "rw");
    for id in ["c1", "c2", "c3", "c4", "c5"] {
        seed = seed
            .dataset(id, 0)
            .tag(ResourceRef::dataset(id), "forest", "rw");
    }
    let (_, engine) = engine(&seed, StaticDirectory::allow_all());

    let out = engine
        .similar_datasets(&strings(&["seed"]), SimilarityMode::Direct, &QueryParams::default())
        .await
        .unwrap();
    let ids: Vec<&str> = out.data.iter().map(|r| r.dataset.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert!(out.data.iter().all(|r| r.number_of_occurrences == 1));
}

#[tokio::test]
async fn test_similarity_never_returns_seeds() {
    let (_, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    for mode in [SimilarityMode::Direct, SimilarityMode::DescendantAware] {
        let seeds = strings(&["both", "river-drought"]);
        let out = engine
            .similar_datasets(&seeds, mode, &QueryParams::default().limit(10))
            .await
            .unwrap();
        assert!(out.data.iter().all(|r| !seeds.contains(&r.dataset)));
        assert!(out.data.iter().any(|r| r.dataset == "water-only"));
    }
}

#[tokio::test]
async fn test_sort_all_datasets_by_views_descending() {
    let (_, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    let out = engine.sort_datasets("-most-viewed", None).await.unwrap();
    assert_eq!(
        out.data,
        strings(&["other-tenant", "water-only", "river-drought", "both"])
    );

    let asc = engine.sort_datasets("most-viewed", None).await.unwrap();
    assert_eq!(
        asc.data,
        strings(&["both", "river-drought", "water-only", "other-tenant"])
    );
}

#[tokio::test]
async fn test_existence_filter_is_subset_of_input() {
    let store = InMemoryGraphStore::from_seed(&hydrology_seed()).unwrap();
    let directory = StaticDirectory::with_visible(["ghost", "both", "water-only", "phantom"]);
    let reconciler = ResultReconciler::new(&store, &directory, RetryPolicy::no_retry());

    let input = strings(&["both", "river-drought", "water-only"]);
    let out = reconciler
        .existence_filter(&input, &strings(&["production"]))
        .await
        .unwrap();
    assert!(out.iter().all(|id| input.contains(id)));
    assert_eq!(out, strings(&["both", "water-only"]));
}

#[tokio::test]
async fn test_replace_tags_twice_is_stable() {
    let (store, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    let both = ResourceRef::dataset("both");
    let wanted = strings(&["river", "drought"]);

    engine
        .replace_tags(&both, &wanted, &QueryParams::default())
        .await
        .unwrap();
    let first: Vec<String> = store
        .tagged_concepts(&both, "rw")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    engine
        .replace_tags(&both, &wanted, &QueryParams::default())
        .await
        .unwrap();
    let mut second: Vec<String> = store
        .tagged_concepts(&both, "rw")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    assert_eq!(first, second);
    second.sort();
    assert_eq!(second, strings(&["drought", "river"]));
}

#[tokio::test]
async fn test_views_feed_most_viewed_ranking() {
    let (store, engine) = engine(&hydrology_seed(), StaticDirectory::allow_all());
    for _ in 0..100 {
        engine
            .visited_dataset("both", Some("alice"), &QueryParams::default())
            .await
            .unwrap();
    }

    let top = engine
        .most_viewed(&QueryParams::default().limit(1))
        .await
        .unwrap();
    assert_eq!(top.data[0].dataset, "both");
    assert_eq!(top.data[0].views, 105);

    let mine = engine
        .most_viewed_by_user("alice", &QueryParams::default())
        .await
        .unwrap();
    assert_eq!(mine.data.len(), 1);
    assert_eq!(mine.data[0].views, 100);

    store
        .delete_resource(&ResourceRef::dataset("both"))
        .await
        .unwrap();
    let mine = engine
        .most_viewed_by_user("alice", &QueryParams::default())
        .await
        .unwrap();
    assert!(mine.data.is_empty());
}
