//! Dataset similarity from shared tags.
//!
//! Two modes:
//! - `Direct`: other datasets sharing a tagged concept with the seeds.
//! - `DescendantAware`: the seeds' tags are widened to all their ancestors,
//!   and a dataset's tag also matches when it sits below one of those
//!   within `SIMILARITY_MAX_HOPS`.
//!
//! Ranking counts distinct matched concepts. Limits are not applied here:
//! candidates must be reconciled against the catalog first.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use taxograph_core::{
    defaults, ConceptId, ConceptKind, GraphStore, ResourceRef, Result, SimilarDataset,
};

use crate::closure::AncestorClosure;
use crate::tag_index::TagIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMode {
    #[default]
    Direct,
    DescendantAware,
}

impl std::str::FromStr for SimilarityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "descendant" | "descendant_aware" | "descendant-aware" => Ok(Self::DescendantAware),
            _ => Err(format!("Invalid similarity mode: {}", s)),
        }
    }
}

/// Similarity options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityOptions {
    pub mode: SimilarityMode,
    /// Only concepts of this kind take part (`None` = any kind).
    pub concept_kind: Option<ConceptKind>,
    /// Hop bound for descendant matching.
    pub max_hops: u32,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            mode: SimilarityMode::Direct,
            concept_kind: Some(ConceptKind::Topic),
            max_hops: defaults::SIMILARITY_MAX_HOPS,
        }
    }
}

impl SimilarityOptions {
    pub fn with_mode(mut self, mode: SimilarityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_concept_kind(mut self, kind: Option<ConceptKind>) -> Self {
        self.concept_kind = kind;
        self
    }
}

#[derive(Clone, Copy)]
pub struct SimilarityRanker<'a> {
    store: &'a dyn GraphStore,
    tags: TagIndex<'a>,
    closure: AncestorClosure<'a>,
}

impl<'a> SimilarityRanker<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            tags: TagIndex::datasets(store),
            closure: AncestorClosure::new(store),
        }
    }

    /// All datasets similar to `seeds`, best first. Seeds never appear.
    pub async fn rank(
        &self,
        seeds: &[String],
        application: &str,
        options: &SimilarityOptions,
    ) -> Result<Vec<SimilarDataset>> {
        let start = Instant::now();
        let seed_tags = self.seed_tags(seeds, application, options).await?;
        if seed_tags.is_empty() {
            debug!(seeds = seeds.len(), "Seeds carry no eligible tags");
            return Ok(Vec::new());
        }

        let matchable = match options.mode {
            SimilarityMode::Direct => seed_tags,
            SimilarityMode::DescendantAware => {
                let ancestors = self.closure.closure_unbounded(&to_vec(&seed_tags)).await?;
                let main_tags: BTreeSet<ConceptId> =
                    seed_tags.into_iter().chain(ancestors).collect();
                let main_tags = self.retain_kind(main_tags, options.concept_kind).await?;
                let below = self
                    .closure
                    .descendants_within_depth(&to_vec(&main_tags), options.max_hops)
                    .await?;
                let below = self.retain_kind(below, options.concept_kind).await?;
                debug!(
                    main_tags = main_tags.len(),
                    descendants = below.len(),
                    "Expanded similarity concepts"
                );
                main_tags.into_iter().chain(below).collect()
            }
        };

        let pairs = self.tags.tag_pairs(&matchable, application).await?;
        let seed_set: BTreeSet<&str> = seeds.iter().map(String::as_str).collect();
        let mut matched: BTreeMap<String, BTreeSet<ConceptId>> = BTreeMap::new();
        for pair in pairs {
            if seed_set.contains(pair.resource_id.as_str()) {
                continue;
            }
            matched
                .entry(pair.resource_id)
                .or_default()
                .insert(pair.concept_id);
        }

        let ranked = rank_matches(matched);
        debug!(
            mode = ?options.mode,
            seeds = seeds.len(),
            candidate_count = ranked.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Similarity ranking complete"
        );
        Ok(ranked)
    }

    /// Union of the seeds' direct tags, looked up concurrently.
    async fn seed_tags(
        &self,
        seeds: &[String],
        application: &str,
        options: &SimilarityOptions,
    ) -> Result<BTreeSet<ConceptId>> {
        let limit = self.store.max_concurrency().max(1);
        let per_seed: Vec<Vec<taxograph_core::Concept>> = stream::iter(seeds)
            .map(|seed| {
                let tags = self.tags;
                async move {
                    tags.tagged_concepts(&ResourceRef::dataset(seed.as_str()), application)
                        .await
                }
            })
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        Ok(per_seed
            .into_iter()
            .flatten()
            .filter(|c| options.concept_kind.map_or(true, |k| c.has_kind(k)))
            .map(|c| c.id)
            .collect())
    }

    async fn retain_kind(
        &self,
        ids: BTreeSet<ConceptId>,
        kind: Option<ConceptKind>,
    ) -> Result<BTreeSet<ConceptId>> {
        let Some(kind) = kind else {
            return Ok(ids);
        };
        if ids.is_empty() {
            return Ok(ids);
        }
        let concepts = self.store.concepts_by_ids(&to_vec(&ids)).await?;
        Ok(concepts
            .into_iter()
            .filter(|c| c.has_kind(kind))
            .map(|c| c.id)
            .collect())
    }
}

fn to_vec(ids: &BTreeSet<ConceptId>) -> Vec<ConceptId> {
    ids.iter().cloned().collect()
}

/// Order by distinct matched concepts, descending; ties by ascending id.
fn rank_matches(matched: BTreeMap<String, BTreeSet<ConceptId>>) -> Vec<SimilarDataset> {
    let mut ranked: Vec<SimilarDataset> = matched
        .into_iter()
        .map(|(dataset, concepts)| SimilarDataset {
            number_of_occurrences: concepts.len(),
            concepts: concepts.into_iter().collect(),
            dataset,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.number_of_occurrences
            .cmp(&a.number_of_occurrences)
            .then_with(|| a.dataset.cmp(&b.dataset))
    });
    ranked
}
