//! Shared fixture for unit tests.
//!
//! ```text
//! water <-PART_OF- freshwater <-IS_A- river
//!                             <-IS_A- lake
//! drought <-IS_A- agricultural_drought <-QUALITY_OF- crop_failure
//! annual (FREQUENCY)
//! ```
//!
//! Datasets in "rw": d1 {water, crop_failure}, d2 {water}, d3 {river, drought},
//! d4 {lake, annual}, d5 {agricultural_drought}. d6 is tagged {drought} in "gfw".

use taxograph_core::{Concept, ConceptKind, HierarchyRelation, ResourceRef};
use taxograph_db::{GraphSeed, InMemoryGraphStore};

fn topic(id: &str, label: &str) -> Concept {
    Concept::new(id, label).with_kinds([ConceptKind::Topic])
}

pub fn water_seed() -> GraphSeed {
    let mut seed = GraphSeed::default()
        .concept(topic("water", "Water").with_synonyms(["H2O"]))
        .concept(topic("freshwater", "Freshwater"))
        .concept(topic("river", "River"))
        .concept(topic("lake", "Lake"))
        .concept(topic("drought", "Drought"))
        .concept(topic("agricultural_drought", "Agricultural drought"))
        .concept(topic("crop_failure", "Crop failure"))
        .concept(Concept::new("annual", "Annual").with_kinds([ConceptKind::Frequency]))
        .relation("freshwater", "water", HierarchyRelation::PartOf)
        .relation("river", "freshwater", HierarchyRelation::IsA)
        .relation("lake", "freshwater", HierarchyRelation::IsA)
        .relation("agricultural_drought", "drought", HierarchyRelation::IsA)
        .relation("crop_failure", "agricultural_drought", HierarchyRelation::QualityOf);

    for (id, views) in [("d1", 10), ("d2", 50), ("d3", 30), ("d4", 0), ("d5", 20), ("d6", 5)] {
        seed = seed.dataset(id, views);
    }
    for (dataset, concept) in [
        ("d1", "water"),
        ("d1", "crop_failure"),
        ("d2", "water"),
        ("d3", "river"),
        ("d3", "drought"),
        ("d4", "lake"),
        ("d4", "annual"),
        ("d5", "agricultural_drought"),
    ] {
        seed = seed.tag(ResourceRef::dataset(dataset), concept, "rw");
    }
    seed.tag(ResourceRef::dataset("d6"), "drought", "gfw")
}

pub fn water_taxonomy() -> InMemoryGraphStore {
    InMemoryGraphStore::from_seed(&water_seed()).expect("fixture is consistent")
}
