//! Hierarchy expansion over the concept taxonomy.

use std::collections::BTreeSet;

use tracing::trace;

use taxograph_core::{ConceptId, GraphStore, Result, TraversalDirection};

/// Expands concept sets along hierarchy edges.
///
/// Every expansion is one `reachable_within_hops` call, so the hop bound is
/// a plain number and traversal cost is owned by the store.
#[derive(Clone, Copy)]
pub struct AncestorClosure<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> AncestorClosure<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Every concept more general than any of `concept_ids`, at any distance.
    ///
    /// Start concepts are excluded unless a cycle leads back to them.
    pub async fn closure_unbounded(&self, concept_ids: &[ConceptId]) -> Result<BTreeSet<ConceptId>> {
        self.expand(concept_ids, TraversalDirection::Broader, None)
            .await
    }

    /// Concepts more general than any of `concept_ids`, 1..=`depth` hops away.
    pub async fn closure_within_depth(
        &self,
        concept_ids: &[ConceptId],
        depth: u32,
    ) -> Result<BTreeSet<ConceptId>> {
        self.expand(concept_ids, TraversalDirection::Broader, Some(depth))
            .await
    }

    /// Concepts more specific than any of `concept_ids`, 1..=`depth` hops away.
    pub async fn descendants_within_depth(
        &self,
        concept_ids: &[ConceptId],
        depth: u32,
    ) -> Result<BTreeSet<ConceptId>> {
        self.expand(concept_ids, TraversalDirection::Narrower, Some(depth))
            .await
    }

    async fn expand(
        &self,
        concept_ids: &[ConceptId],
        direction: TraversalDirection,
        max_hops: Option<u32>,
    ) -> Result<BTreeSet<ConceptId>> {
        if concept_ids.is_empty() || max_hops == Some(0) {
            return Ok(BTreeSet::new());
        }
        let reached = self
            .store
            .reachable_within_hops(concept_ids, direction, max_hops)
            .await?;
        trace!(
            ?direction,
            ?max_hops,
            from_count = concept_ids.len(),
            closure_size = reached.len(),
            "Expanded concept closure"
        );
        Ok(reached.into_iter().map(|r| r.concept_id).collect())
    }
}
