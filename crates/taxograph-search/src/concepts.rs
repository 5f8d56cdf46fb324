//! Concept catalogue queries: listings, per-dataset tags, inferred
//! ancestors and label search.

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use taxograph_core::{
    Concept, ConceptFilter, ConceptId, ConceptUsage, DatasetConcept, GraphStore, ResourceRef,
    Result,
};

use crate::closure::AncestorClosure;
use crate::tag_index::TagIndex;

#[derive(Clone, Copy)]
pub struct ConceptCatalogue<'a> {
    store: &'a dyn GraphStore,
    tags: TagIndex<'a>,
    closure: AncestorClosure<'a>,
}

impl<'a> ConceptCatalogue<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            tags: TagIndex::datasets(store),
            closure: AncestorClosure::new(store),
        }
    }

    /// Concepts matching `filter` with their tagged datasets, most used first.
    pub async fn list_concepts(
        &self,
        application: &str,
        filter: &ConceptFilter,
    ) -> Result<Vec<ConceptUsage>> {
        let mut rows = self.store.list_concepts(application, filter).await?;
        rows.sort_by(|a, b| {
            b.number_of_datasets_tagged
                .cmp(&a.number_of_datasets_tagged)
                .then_with(|| a.concept.id.cmp(&b.concept.id))
        });
        Ok(rows)
    }

    pub async fn concepts_by_dataset(
        &self,
        dataset_id: &str,
        application: &str,
    ) -> Result<Vec<Concept>> {
        let mut concepts = self
            .tags
            .tagged_concepts(&ResourceRef::dataset(dataset_id), application)
            .await?;
        concepts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(concepts)
    }

    /// Tags of several datasets, fetched concurrently and flattened.
    pub async fn concepts_by_datasets(
        &self,
        dataset_ids: &[String],
        application: &str,
    ) -> Result<Vec<DatasetConcept>> {
        let limit = self.store.max_concurrency().max(1);
        let per_dataset: Vec<Vec<DatasetConcept>> = stream::iter(dataset_ids)
            .map(|dataset| async move {
                let concepts = self.concepts_by_dataset(dataset, application).await?;
                Ok::<_, taxograph_core::Error>(
                    concepts
                        .into_iter()
                        .map(|concept| DatasetConcept {
                            dataset: dataset.clone(),
                            concept,
                        })
                        .collect(),
                )
            })
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        let mut rows: Vec<DatasetConcept> = per_dataset.into_iter().flatten().collect();
        rows.sort_by(|a, b| {
            a.dataset
                .cmp(&b.dataset)
                .then_with(|| a.concept.id.cmp(&b.concept.id))
        });
        rows.dedup_by(|a, b| a.dataset == b.dataset && a.concept.id == b.concept.id);
        Ok(rows)
    }

    /// The given concepts that exist plus all of their ancestors.
    pub async fn concepts_inferred(&self, concept_ids: &[ConceptId]) -> Result<Vec<Concept>> {
        let ancestors = self.closure.closure_unbounded(concept_ids).await?;
        let all: BTreeSet<ConceptId> = concept_ids.iter().cloned().chain(ancestors).collect();
        self.records(all).await
    }

    /// Only the ancestors of the given concepts.
    pub async fn concepts_ancestors(&self, concept_ids: &[ConceptId]) -> Result<Vec<Concept>> {
        let ancestors = self.closure.closure_unbounded(concept_ids).await?;
        self.records(ancestors).await
    }

    /// Datasets tagged with a concept whose label or a synonym contains one
    /// of `terms`, ascending by id.
    pub async fn search_by_label_synonyms(
        &self,
        terms: &[String],
        application: &str,
    ) -> Result<Vec<String>> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let filter = ConceptFilter {
            includes: Vec::new(),
            search: terms,
        };
        let rows = self.store.list_concepts(application, &filter).await?;
        let matched_concepts = rows.len();
        let datasets: BTreeSet<String> = rows.into_iter().flat_map(|row| row.datasets).collect();
        debug!(
            matched_concepts,
            result_count = datasets.len(),
            "Label search complete"
        );
        Ok(datasets.into_iter().collect())
    }

    async fn records(&self, ids: BTreeSet<ConceptId>) -> Result<Vec<Concept>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ConceptId> = ids.into_iter().collect();
        let mut concepts = self.store.concepts_by_ids(&ids).await?;
        concepts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(concepts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::water_taxonomy;
    use taxograph_core::ConceptKind;

    fn ids(concepts: &[Concept]) -> Vec<&str> {
        concepts.iter().map(|c| c.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_concepts_orders_by_usage() {
        let store = water_taxonomy();
        let catalogue = ConceptCatalogue::new(&store);
        let filter = ConceptFilter::from_params(Some("topic"), None);
        let rows = catalogue.list_concepts("rw", &filter).await.unwrap();

        assert_eq!(rows[0].concept.id, "water");
        assert_eq!(rows[0].number_of_datasets_tagged, 2);
        assert_eq!(rows[0].datasets, vec!["d1", "d2"]);
        assert!(rows.iter().all(|r| r.concept.has_kind(ConceptKind::Topic)));
        // Untagged concepts are still listed, at the end.
        let last = rows.last().unwrap();
        assert_eq!(last.number_of_datasets_tagged, 0);
        assert_eq!(last.concept.id, "freshwater");
    }

    #[tokio::test]
    async fn test_list_concepts_search_matches_synonyms() {
        let store = water_taxonomy();
        let catalogue = ConceptCatalogue::new(&store);
        let filter = ConceptFilter::from_params(None, Some("h2o"));
        let rows = catalogue.list_concepts("rw", &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].concept.id, "water");
    }

    #[tokio::test]
    async fn test_concepts_by_datasets_flattens_rows() {
        let store = water_taxonomy();
        let catalogue = ConceptCatalogue::new(&store);
        let rows = catalogue
            .concepts_by_datasets(&["d3".into(), "d1".into()], "rw")
            .await
            .unwrap();
        let got: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.dataset.as_str(), r.concept.id.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("d1", "crop_failure"),
                ("d1", "water"),
                ("d3", "drought"),
                ("d3", "river"),
            ]
        );
    }

    #[tokio::test]
    async fn test_inferred_includes_inputs_and_ancestors() {
        let store = water_taxonomy();
        let catalogue = ConceptCatalogue::new(&store);
        let inferred = catalogue
            .concepts_inferred(&["river".into(), "unknown".into()])
            .await
            .unwrap();
        assert_eq!(ids(&inferred), vec!["freshwater", "river", "water"]);

        let ancestors = catalogue.concepts_ancestors(&["river".into()]).await.unwrap();
        assert_eq!(ids(&ancestors), vec!["freshwater", "water"]);
    }

    #[tokio::test]
    async fn test_search_by_label_synonyms() {
        let store = water_taxonomy();
        let catalogue = ConceptCatalogue::new(&store);
        let out = catalogue
            .search_by_label_synonyms(&["drought".into()], "rw")
            .await
            .unwrap();
        // "drought" and "agricultural drought" labels both match.
        assert_eq!(out, vec!["d3", "d5"]);

        let out = catalogue
            .search_by_label_synonyms(&["LAKE".into(), "h2o".into()], "rw")
            .await
            .unwrap();
        assert_eq!(out, vec!["d1", "d2", "d4"]);

        assert!(catalogue
            .search_by_label_synonyms(&[" ".into()], "rw")
            .await
            .unwrap()
            .is_empty());
    }
}
