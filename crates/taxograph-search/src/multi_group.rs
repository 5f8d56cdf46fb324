//! Multi-group concept search.
//!
//! A query is 1..=3 ordered groups, each an OR-list of concepts. A dataset
//! matches a group when it is tagged with one of the group's concepts, or
//! with a concept whose ancestor chain reaches one of them within `depth`
//! hops. The result is the intersection over groups, evaluated in order so
//! each group only narrows what the previous ones kept.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use taxograph_core::{defaults, ConceptId, Error, GraphStore, Result};

use crate::closure::AncestorClosure;
use crate::tag_index::TagIndex;

/// Validate a caller-supplied depth.
pub fn validate_depth(depth: i64) -> Result<u32> {
    if depth < 0 {
        return Err(Error::InvalidQuery(format!(
            "depth must not be negative, got {}",
            depth
        )));
    }
    u32::try_from(depth)
        .map_err(|_| Error::InvalidQuery(format!("depth {} is out of range", depth)))
}

/// Validate the number of groups.
pub fn validate_groups(groups: &[Vec<ConceptId>]) -> Result<()> {
    if groups.len() > defaults::MAX_CONCEPT_GROUPS {
        return Err(Error::InvalidQuery(format!(
            "at most {} concept groups are supported, got {}",
            defaults::MAX_CONCEPT_GROUPS,
            groups.len()
        )));
    }
    Ok(())
}

#[derive(Clone, Copy)]
pub struct MultiGroupSearch<'a> {
    tags: TagIndex<'a>,
    closure: AncestorClosure<'a>,
}

impl<'a> MultiGroupSearch<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            tags: TagIndex::datasets(store),
            closure: AncestorClosure::new(store),
        }
    }

    /// Datasets matching every group, ascending by id.
    pub async fn search(
        &self,
        groups: &[Vec<ConceptId>],
        application: &str,
        depth: i64,
    ) -> Result<Vec<String>> {
        validate_groups(groups)?;
        let depth = validate_depth(depth)?;
        let start = Instant::now();

        let mut candidates: Option<BTreeSet<String>> = None;
        for (index, group) in groups.iter().enumerate() {
            let matched = self.qualifies(group, application, depth).await?;
            let narrowed: BTreeSet<String> = match candidates {
                None => matched,
                Some(previous) => previous.intersection(&matched).cloned().collect(),
            };
            debug!(
                group = index + 1,
                group_size = group.len(),
                candidate_count = narrowed.len(),
                "Evaluated concept group"
            );
            if narrowed.is_empty() {
                debug!(group = index + 1, "Candidate set empty, stopping early");
                return Ok(Vec::new());
            }
            candidates = Some(narrowed);
        }

        let result: Vec<String> = candidates.unwrap_or_default().into_iter().collect();
        debug!(
            groups = groups.len(),
            depth,
            result_count = result.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Multi-group search complete"
        );
        Ok(result)
    }

    /// Datasets matching one group: direct tags plus tags on descendants
    /// within `depth`. Both branches run concurrently.
    pub async fn qualifies(
        &self,
        group: &[ConceptId],
        application: &str,
        depth: u32,
    ) -> Result<BTreeSet<String>> {
        if group.is_empty() {
            return Ok(BTreeSet::new());
        }

        let direct = self.tags.resources_tagged_with(group, application);
        let via_descendants = async {
            let descendants = self.closure.descendants_within_depth(group, depth).await?;
            self.tags
                .resources_tagged_with_set(&descendants, application)
                .await
        };

        let (mut matched, via_descendants) = tokio::try_join!(direct, via_descendants)?;
        matched.extend(via_descendants);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::water_taxonomy;

    fn groups(raw: &[&[&str]]) -> Vec<Vec<ConceptId>> {
        raw.iter()
            .map(|g| g.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_water_and_drought_uses_descendants() {
        let store = water_taxonomy();
        let search = MultiGroupSearch::new(&store);
        let out = search
            .search(&groups(&[&["water"], &["drought"]]), "rw", 15)
            .await
            .unwrap();
        // d1: water + crop_failure (drought descendant); d3: river (water
        // descendant) + drought. d2 only has water.
        assert_eq!(out, vec!["d1", "d3"]);
    }

    #[tokio::test]
    async fn test_depth_zero_is_plain_intersection() {
        let store = water_taxonomy();
        let search = MultiGroupSearch::new(&store);
        let out = search
            .search(&groups(&[&["water"], &["drought"]]), "rw", 0)
            .await
            .unwrap();
        assert!(out.is_empty());

        let out = search
            .search(&groups(&[&["river", "water"], &["drought"]]), "rw", 0)
            .await
            .unwrap();
        assert_eq!(out, vec!["d3"]);
    }

    #[tokio::test]
    async fn test_depth_limits_descendants() {
        let store = water_taxonomy();
        let search = MultiGroupSearch::new(&store);
        // crop_failure is two hops below drought.
        let one = search
            .search(&groups(&[&["drought"]]), "rw", 1)
            .await
            .unwrap();
        assert_eq!(one, vec!["d3", "d5"]);

        let two = search
            .search(&groups(&[&["drought"]]), "rw", 2)
            .await
            .unwrap();
        assert_eq!(two, vec!["d1", "d3", "d5"]);
    }

    #[tokio::test]
    async fn test_three_groups_narrow_in_order() {
        let store = water_taxonomy();
        let search = MultiGroupSearch::new(&store);
        let out = search
            .search(
                &groups(&[&["water"], &["drought"], &["river"]]),
                "rw",
                15,
            )
            .await
            .unwrap();
        assert_eq!(out, vec!["d3"]);
    }

    #[tokio::test]
    async fn test_empty_inputs_give_empty_results() {
        let store = water_taxonomy();
        let search = MultiGroupSearch::new(&store);
        assert!(search.search(&[], "rw", 15).await.unwrap().is_empty());
        assert!(search
            .search(&groups(&[&["water"], &[]]), "rw", 15)
            .await
            .unwrap()
            .is_empty());
        assert!(search
            .search(&groups(&[&["water"]]), "nope", 15)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rejects_four_groups_and_negative_depth() {
        let store = water_taxonomy();
        let search = MultiGroupSearch::new(&store);
        let err = search
            .search(&groups(&[&["a"], &["b"], &["c"], &["d"]]), "rw", 15)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));

        let err = search
            .search(&groups(&[&["water"]]), "rw", -1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }
}
