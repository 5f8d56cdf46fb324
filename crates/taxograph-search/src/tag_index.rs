//! Tenant-scoped access to dataset tags.

use std::collections::BTreeSet;

use taxograph_core::{Concept, ConceptId, GraphStore, ResourceRef, ResourceType, Result, TagPair};

/// Read view over resource→concept tags for one resource type.
#[derive(Clone, Copy)]
pub struct TagIndex<'a> {
    store: &'a dyn GraphStore,
    kind: ResourceType,
}

impl<'a> TagIndex<'a> {
    /// Index over dataset tags.
    pub fn datasets(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            kind: ResourceType::Dataset,
        }
    }

    /// Resources directly tagged with any of `concept_ids` in `application`.
    pub async fn resources_tagged_with(
        &self,
        concept_ids: &[ConceptId],
        application: &str,
    ) -> Result<BTreeSet<String>> {
        if concept_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let ids = self
            .store
            .resources_tagged_with(concept_ids, self.kind, application)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Same as [`Self::resources_tagged_with`] for an already-expanded set.
    pub async fn resources_tagged_with_set(
        &self,
        concept_ids: &BTreeSet<ConceptId>,
        application: &str,
    ) -> Result<BTreeSet<String>> {
        let ids: Vec<ConceptId> = concept_ids.iter().cloned().collect();
        self.resources_tagged_with(&ids, application).await
    }

    /// Concepts directly tagged to `resource` in `application`.
    pub async fn tagged_concepts(
        &self,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<Vec<Concept>> {
        self.store.tagged_concepts(resource, application).await
    }

    /// Tag edges to any of `concept_ids`, for similarity counting.
    pub async fn tag_pairs(
        &self,
        concept_ids: &BTreeSet<ConceptId>,
        application: &str,
    ) -> Result<Vec<TagPair>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ConceptId> = concept_ids.iter().cloned().collect();
        self.store.tag_pairs(&ids, self.kind, application).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::water_taxonomy;

    #[tokio::test]
    async fn test_tags_are_scoped_by_application() {
        let store = water_taxonomy();
        let index = TagIndex::datasets(&store);

        let rw = index
            .resources_tagged_with(&["drought".into()], "rw")
            .await
            .unwrap();
        assert_eq!(rw.into_iter().collect::<Vec<_>>(), vec!["d3"]);

        let gfw = index
            .resources_tagged_with(&["drought".into()], "gfw")
            .await
            .unwrap();
        assert_eq!(gfw.into_iter().collect::<Vec<_>>(), vec!["d6"]);
    }

    #[tokio::test]
    async fn test_empty_concepts_match_nothing() {
        let store = water_taxonomy();
        let index = TagIndex::datasets(&store);
        assert!(index.resources_tagged_with(&[], "rw").await.unwrap().is_empty());
        assert!(index.tag_pairs(&BTreeSet::new(), "rw").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tag_pairs_carry_concept() {
        let store = water_taxonomy();
        let index = TagIndex::datasets(&store);
        let wanted: BTreeSet<ConceptId> = ["water".to_string()].into_iter().collect();
        let pairs = index.tag_pairs(&wanted, "rw").await.unwrap();
        let datasets: Vec<&str> = pairs.iter().map(|p| p.resource_id.as_str()).collect();
        assert_eq!(datasets, vec!["d1", "d2"]);
        assert!(pairs.iter().all(|p| p.concept_id == "water"));
    }
}
