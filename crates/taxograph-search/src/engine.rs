//! Per-request query pipeline.
//!
//! `GraphQueryEngine` is the facade callers use: it resolves request
//! parameters against configured defaults, runs search or similarity,
//! reconciles candidates with the catalog, ranks, truncates, and labels
//! every answer with the cache bucket it belongs to. Writes go through the
//! same facade and report the buckets they invalidate.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use taxograph_core::config::{env_string, split_list};
use taxograph_core::{
    defaults, Concept, ConceptFilter, ConceptId, ConceptUsage, DatasetConcept, DatasetViews,
    Error, GraphStore, GraphWriter, Invalidation, MetricCount, ResourceDirectory, ResourceRef,
    ResourceType, Result, SimilarDataset, SortSpec, TagScope, GRAPH_DATASET, GRAPH_DEFAULT,
};

use crate::concepts::ConceptCatalogue;
use crate::multi_group::MultiGroupSearch;
use crate::reconcile::{retain_confirmed, truncate, ResultReconciler, RetryPolicy};
use crate::similarity::{SimilarityMode, SimilarityOptions, SimilarityRanker};

/// Engine-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_application: String,
    pub default_env: Vec<String>,
    pub similar_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_application: defaults::APPLICATION.to_string(),
            default_env: vec![defaults::ENV.to_string()],
            similar_limit: defaults::SIMILAR_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Read `DEFAULT_APPLICATION`, `DEFAULT_ENV` and the catalog retry
    /// variables.
    pub fn from_env() -> Result<Self> {
        let env = split_list(&env_string("DEFAULT_ENV", defaults::ENV));
        Ok(Self {
            default_application: env_string("DEFAULT_APPLICATION", defaults::APPLICATION),
            default_env: if env.is_empty() {
                vec![defaults::ENV.to_string()]
            } else {
                env
            },
            similar_limit: defaults::SIMILAR_LIMIT,
            retry: RetryPolicy::from_env()?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Optional request parameters; unset values fall back to `EngineConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub application: Option<String>,
    /// Comma-separated environments.
    pub env: Option<String>,
    pub depth: Option<i64>,
    pub limit: Option<usize>,
    /// `most-viewed` or `most-favorited`, optionally prefixed with `-`.
    pub sort: Option<String>,
}

impl QueryParams {
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn depth(mut self, depth: i64) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }
}

/// Read result plus the cache bucket it should be stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResponse<T> {
    pub data: T,
    pub cache: &'static str,
}

impl<T> QueryResponse<T> {
    fn dataset(data: T) -> Self {
        Self {
            data,
            cache: GRAPH_DATASET,
        }
    }

    fn concept(data: T) -> Self {
        Self {
            data,
            cache: GRAPH_DEFAULT,
        }
    }
}

/// Parse a `sort` parameter.
pub fn parse_sort(raw: &str) -> Result<SortSpec> {
    raw.parse().map_err(Error::InvalidQuery)
}

pub struct GraphQueryEngine {
    store: Arc<dyn GraphStore>,
    writer: Arc<dyn GraphWriter>,
    directory: Arc<dyn ResourceDirectory>,
    config: EngineConfig,
}

impl GraphQueryEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        writer: Arc<dyn GraphWriter>,
        directory: Arc<dyn ResourceDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            writer,
            directory,
            config,
        }
    }

    /// Engine over a store that implements both the read and write side.
    pub fn with_store<S>(
        store: Arc<S>,
        directory: Arc<dyn ResourceDirectory>,
        config: EngineConfig,
    ) -> Self
    where
        S: GraphStore + GraphWriter + 'static,
    {
        Self::new(store.clone(), store, directory, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn healthcheck(&self) -> Result<()> {
        self.store.healthcheck().await
    }

    fn application<'p>(&'p self, params: &'p QueryParams) -> &'p str {
        params
            .application
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.config.default_application)
    }

    fn env(&self, params: &QueryParams) -> Vec<String> {
        match params.env.as_deref().map(split_list) {
            Some(env) if !env.is_empty() => env,
            _ => self.config.default_env.clone(),
        }
    }

    fn sort(params: &QueryParams) -> Result<Option<SortSpec>> {
        params.sort.as_deref().map(parse_sort).transpose()
    }

    fn reconciler(&self) -> ResultReconciler<'_> {
        ResultReconciler::new(
            self.store.as_ref(),
            self.directory.as_ref(),
            self.config.retry,
        )
    }

    // =========================================================================
    // DATASET QUERIES
    // =========================================================================

    /// Visible dataset ids matching the concept groups.
    ///
    /// With a `sort`, candidates are ordered by that metric; without
    /// groups, the whole dataset population is sorted. Groups and sort
    /// cannot both be absent.
    #[instrument(skip(self, groups, params), fields(
        subsystem = "search",
        component = "engine",
        op = "search_dataset_ids",
        request_id = %Uuid::now_v7(),
        groups = groups.len(),
    ))]
    pub async fn search_dataset_ids(
        &self,
        groups: &[Vec<ConceptId>],
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<String>>> {
        let start = Instant::now();
        let application = self.application(params);
        let env = self.env(params);
        let sort = Self::sort(params)?;
        let depth = params.depth.unwrap_or(defaults::SEARCH_DEPTH);
        let reconciler = self.reconciler();

        // An empty group still takes part and empties the intersection.
        let has_concepts = !groups.is_empty();
        let ranked = match (has_concepts, sort) {
            (true, sort) => {
                let ids = MultiGroupSearch::new(self.store.as_ref())
                    .search(groups, application, depth)
                    .await?;
                match sort {
                    Some(sort) if !ids.is_empty() => {
                        reconciler
                            .rank_by_secondary_metric(sort, Some(ids.as_slice()))
                            .await?
                    }
                    _ => ids,
                }
            }
            (false, Some(sort)) => reconciler.rank_by_secondary_metric(sort, None).await?,
            (false, None) => {
                return Err(Error::InvalidQuery(
                    "either concepts or sort must be provided".to_string(),
                ))
            }
        };

        let confirmed = reconciler.existence_filter(&ranked, &env).await?;
        let mut result = retain_confirmed(ranked, &confirmed, |id| id);
        truncate(&mut result, params.limit);

        info!(
            application,
            depth,
            result_count = result.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Dataset search complete"
        );
        Ok(QueryResponse::dataset(result))
    }

    /// Dataset ids ordered by a secondary metric. No catalog reconciliation.
    #[instrument(skip(self, candidates), fields(
        subsystem = "search",
        component = "engine",
        op = "sort_datasets",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn sort_datasets(
        &self,
        sort: &str,
        candidates: Option<&[String]>,
    ) -> Result<QueryResponse<Vec<String>>> {
        let sort = parse_sort(sort)?;
        let ranked = self
            .reconciler()
            .rank_by_secondary_metric(sort, candidates)
            .await?;
        Ok(QueryResponse::dataset(ranked))
    }

    /// Datasets similar to `seeds`, reconciled then truncated (default 3).
    #[instrument(skip(self, seeds, params), fields(
        subsystem = "search",
        component = "engine",
        op = "similar_datasets",
        request_id = %Uuid::now_v7(),
        seeds = seeds.len(),
    ))]
    pub async fn similar_datasets(
        &self,
        seeds: &[String],
        mode: SimilarityMode,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<SimilarDataset>>> {
        let start = Instant::now();
        let application = self.application(params);
        let env = self.env(params);
        let options = SimilarityOptions::default().with_mode(mode);

        let ranked = SimilarityRanker::new(self.store.as_ref())
            .rank(seeds, application, &options)
            .await?;
        let ids: Vec<String> = ranked.iter().map(|r| r.dataset.clone()).collect();
        let confirmed = self.reconciler().existence_filter(&ids, &env).await?;
        let mut result = retain_confirmed(ranked, &confirmed, |r| &r.dataset);
        truncate(
            &mut result,
            Some(params.limit.unwrap_or(self.config.similar_limit)),
        );

        info!(
            application,
            candidate_count = ids.len(),
            result_count = result.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Similarity query complete"
        );
        Ok(QueryResponse::dataset(result))
    }

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "most_liked_datasets",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn most_liked_datasets(
        &self,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<MetricCount>>> {
        let application = self.application(params);
        let mut liked = self.reconciler().most_liked_datasets(application).await?;
        truncate(&mut liked, params.limit);
        Ok(QueryResponse::dataset(liked))
    }

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "most_viewed",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn most_viewed(
        &self,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<DatasetViews>>> {
        let application = self.application(params);
        let env = self.env(params);
        let rows = self
            .reconciler()
            .most_viewed(application, &env, params.limit)
            .await?;
        Ok(QueryResponse::dataset(rows))
    }

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "most_viewed_by_user",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn most_viewed_by_user(
        &self,
        user_id: &str,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<DatasetViews>>> {
        let application = self.application(params);
        let env = self.env(params);
        let rows = self
            .reconciler()
            .most_viewed_by_user(user_id, application, &env, params.limit)
            .await?;
        Ok(QueryResponse::dataset(rows))
    }

    // =========================================================================
    // CONCEPT QUERIES
    // =========================================================================

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "list_concepts",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn list_concepts(
        &self,
        includes: Option<&str>,
        search: Option<&str>,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<ConceptUsage>>> {
        let filter = ConceptFilter::from_params(includes, search);
        debug!(includes = ?filter.includes, terms = filter.search.len(), "Concept filter");
        let rows = ConceptCatalogue::new(self.store.as_ref())
            .list_concepts(self.application(params), &filter)
            .await?;
        Ok(QueryResponse::concept(rows))
    }

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "concepts_by_dataset",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn concepts_by_dataset(
        &self,
        dataset_id: &str,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<Concept>>> {
        let concepts = ConceptCatalogue::new(self.store.as_ref())
            .concepts_by_dataset(dataset_id, self.application(params))
            .await?;
        Ok(QueryResponse::concept(concepts))
    }

    #[instrument(skip(self, dataset_ids, params), fields(
        subsystem = "search",
        component = "engine",
        op = "concepts_by_datasets",
        request_id = %Uuid::now_v7(),
        datasets = dataset_ids.len(),
    ))]
    pub async fn concepts_by_datasets(
        &self,
        dataset_ids: &[String],
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<DatasetConcept>>> {
        let rows = ConceptCatalogue::new(self.store.as_ref())
            .concepts_by_datasets(dataset_ids, self.application(params))
            .await?;
        Ok(QueryResponse::concept(rows))
    }

    #[instrument(skip(self, concept_ids), fields(
        subsystem = "search",
        component = "engine",
        op = "concepts_inferred",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn concepts_inferred(
        &self,
        concept_ids: &[ConceptId],
    ) -> Result<QueryResponse<Vec<Concept>>> {
        let concepts = ConceptCatalogue::new(self.store.as_ref())
            .concepts_inferred(concept_ids)
            .await?;
        Ok(QueryResponse::concept(concepts))
    }

    #[instrument(skip(self, concept_ids), fields(
        subsystem = "search",
        component = "engine",
        op = "concepts_ancestors",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn concepts_ancestors(
        &self,
        concept_ids: &[ConceptId],
    ) -> Result<QueryResponse<Vec<Concept>>> {
        let concepts = ConceptCatalogue::new(self.store.as_ref())
            .concepts_ancestors(concept_ids)
            .await?;
        Ok(QueryResponse::concept(concepts))
    }

    /// Datasets tagged with concepts whose label or synonyms contain any
    /// space-separated word of `search`.
    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "search_by_label_synonyms",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn search_by_label_synonyms(
        &self,
        search: &str,
        params: &QueryParams,
    ) -> Result<QueryResponse<Vec<String>>> {
        let terms: Vec<String> = search.split_whitespace().map(String::from).collect();
        let datasets = ConceptCatalogue::new(self.store.as_ref())
            .search_by_label_synonyms(&terms, self.application(params))
            .await?;
        Ok(QueryResponse::concept(datasets))
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Count a dataset view, and the user's view when `user_id` is given.
    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "visited_dataset",
        request_id = %Uuid::now_v7(),
    ))]
    pub async fn visited_dataset(
        &self,
        dataset_id: &str,
        user_id: Option<&str>,
        params: &QueryParams,
    ) -> Result<Invalidation> {
        self.writer
            .record_view(dataset_id, user_id, self.application(params))
            .await?;
        Ok(Invalidation::for_dataset(dataset_id))
    }

    #[instrument(skip(self), fields(
        subsystem = "search",
        component = "engine",
        op = "create_resource",
        request_id = %Uuid::now_v7(),
        resource = %resource,
    ))]
    pub async fn create_resource(
        &self,
        resource: &ResourceRef,
        parent: Option<&ResourceRef>,
    ) -> Result<Invalidation> {
        self.writer.create_resource(resource, parent).await?;
        info!("Resource created");
        Ok(resource_invalidation(resource))
    }

    #[instrument(skip(self), fields(
        subsystem = "search",
        component = "engine",
        op = "delete_resource",
        request_id = %Uuid::now_v7(),
        resource = %resource,
    ))]
    pub async fn delete_resource(&self, resource: &ResourceRef) -> Result<Invalidation> {
        self.writer.delete_resource(resource).await?;
        info!("Resource deleted");
        Ok(resource_invalidation(resource))
    }

    #[instrument(skip(self, concepts, params), fields(
        subsystem = "search",
        component = "engine",
        op = "tag_resource",
        request_id = %Uuid::now_v7(),
        resource = %resource,
        concepts = concepts.len(),
    ))]
    pub async fn tag_resource(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        params: &QueryParams,
    ) -> Result<Invalidation> {
        self.writer
            .tag_resource(resource, concepts, self.application(params))
            .await?;
        Ok(Invalidation::for_tags_added(resource))
    }

    #[instrument(skip(self, concepts, params), fields(
        subsystem = "search",
        component = "engine",
        op = "replace_tags",
        request_id = %Uuid::now_v7(),
        resource = %resource,
        concepts = concepts.len(),
    ))]
    pub async fn replace_tags(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        params: &QueryParams,
    ) -> Result<Invalidation> {
        self.writer
            .replace_tags(resource, concepts, self.application(params))
            .await?;
        Ok(Invalidation::for_tags_replaced(resource))
    }

    #[instrument(skip(self), fields(
        subsystem = "search",
        component = "engine",
        op = "clear_tags",
        request_id = %Uuid::now_v7(),
        resource = %resource,
    ))]
    pub async fn clear_tags(&self, resource: &ResourceRef, scope: &TagScope) -> Result<Invalidation> {
        if *scope == TagScope::AllApplications {
            info!("Clearing tags in every application");
        }
        self.writer.clear_tags(resource, scope).await?;
        Ok(Invalidation::for_tags_replaced(resource))
    }

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "add_favourite",
        request_id = %Uuid::now_v7(),
        resource = %resource,
    ))]
    pub async fn add_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        params: &QueryParams,
    ) -> Result<Invalidation> {
        self.writer
            .add_favourite(user_id, resource, self.application(params))
            .await?;
        Ok(resource_invalidation(resource))
    }

    #[instrument(skip(self, params), fields(
        subsystem = "search",
        component = "engine",
        op = "remove_favourite",
        request_id = %Uuid::now_v7(),
        resource = %resource,
    ))]
    pub async fn remove_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        params: &QueryParams,
    ) -> Result<Invalidation> {
        self.writer
            .remove_favourite(user_id, resource, self.application(params))
            .await?;
        Ok(resource_invalidation(resource))
    }
}

fn resource_invalidation(resource: &ResourceRef) -> Invalidation {
    match resource.kind {
        ResourceType::Dataset => Invalidation::for_dataset(&resource.id),
        _ => Invalidation::for_resource(resource),
    }
}
