//! Core traits for taxograph abstractions.
//!
//! These traits define the contracts the search engine is written against,
//! enabling pluggable graph stores and catalogs and keeping the algorithms
//! testable without a database.

use async_trait::async_trait;

use crate::defaults;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// GRAPH STORE (READ)
// =============================================================================

/// Read primitives over the concept taxonomy and the tag graph.
///
/// Every method is a single typed query: the engine composes them, stores
/// never receive traversal expressions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upper bound for concurrent calls issued within one request.
    fn max_concurrency(&self) -> usize {
        defaults::STORE_MAX_CONNECTIONS as usize
    }

    /// Cheap round trip proving the store is reachable.
    async fn healthcheck(&self) -> Result<()>;

    /// Concepts reachable from any of `from` in 1..=`max_hops` hierarchy
    /// hops (`None` = unbounded), each reported once with its fewest hops.
    ///
    /// Must terminate on cyclic hierarchies.
    async fn reachable_within_hops(
        &self,
        from: &[ConceptId],
        direction: TraversalDirection,
        max_hops: Option<u32>,
    ) -> Result<Vec<ReachableConcept>>;

    /// Concept records for the ids that exist; unknown ids are skipped.
    async fn concepts_by_ids(&self, ids: &[ConceptId]) -> Result<Vec<Concept>>;

    /// All concepts matching `filter`, with the datasets tagged with each
    /// in `application`.
    async fn list_concepts(
        &self,
        application: &str,
        filter: &ConceptFilter,
    ) -> Result<Vec<ConceptUsage>>;

    /// Ids of resources of `kind` directly tagged with any of `concepts`.
    async fn resources_tagged_with(
        &self,
        concepts: &[ConceptId],
        kind: ResourceType,
        application: &str,
    ) -> Result<Vec<String>>;

    /// Tag edges from resources of `kind` to any of `concepts`.
    async fn tag_pairs(
        &self,
        concepts: &[ConceptId],
        kind: ResourceType,
        application: &str,
    ) -> Result<Vec<TagPair>>;

    /// Concepts directly tagged to `resource` in `application`.
    async fn tagged_concepts(
        &self,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<Vec<Concept>>;

    async fn resource_exists(&self, resource: &ResourceRef) -> Result<bool>;

    /// View counters of datasets, restricted to `candidates` when given.
    async fn dataset_views(&self, candidates: Option<&[String]>) -> Result<Vec<MetricCount>>;

    /// Favourite edge counts per dataset (zero included), optionally scoped
    /// to one application and restricted to `candidates`.
    async fn favourite_counts(
        &self,
        application: Option<&str>,
        candidates: Option<&[String]>,
    ) -> Result<Vec<MetricCount>>;

    /// Per-user view counters for datasets viewed by `user_id`.
    async fn user_dataset_views(&self, user_id: &str, application: &str)
        -> Result<Vec<MetricCount>>;
}

// =============================================================================
// GRAPH STORE (WRITE)
// =============================================================================

/// Mutations on resources, tags, favourites and view counters.
#[async_trait]
pub trait GraphWriter: Send + Sync {
    /// Create a resource node, optionally attached to its owning resource.
    async fn create_resource(&self, resource: &ResourceRef, parent: Option<&ResourceRef>)
        -> Result<()>;

    /// Delete a resource, the resources belonging to it, and all their tags.
    async fn delete_resource(&self, resource: &ResourceRef) -> Result<()>;

    /// Add tags (merge semantics).
    async fn tag_resource(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()>;

    /// Make the tag set of (`resource`, `application`) exactly `concepts`.
    async fn replace_tags(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()>;

    async fn clear_tags(&self, resource: &ResourceRef, scope: &TagScope) -> Result<()>;

    async fn add_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<()>;

    async fn remove_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<()>;

    /// Increment the dataset view counter and, when a user is given, that
    /// user's view counter for the dataset.
    async fn record_view(
        &self,
        dataset_id: &str,
        user_id: Option<&str>,
        application: &str,
    ) -> Result<()>;
}

// =============================================================================
// RESOURCE CATALOG
// =============================================================================

/// Authoritative catalog deciding which resources exist and are visible.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Entries for the ids that are visible in any of `env`.
    async fn find_by_ids(&self, ids: &[String], env: &[String]) -> Result<Vec<DirectoryEntry>>;
}
