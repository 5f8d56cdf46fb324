//! Reconciliation of graph-derived candidates with the resource catalog,
//! and secondary-metric ranking.
//!
//! The graph may know about datasets the catalog has since deleted or
//! hidden, so every user-facing dataset list passes `existence_filter`
//! before it is truncated.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use taxograph_core::config::env_or;
use taxograph_core::{
    defaults, DatasetViews, Error, GraphStore, MetricCount, ResourceDirectory, Result,
    SortDirection, SortMetric, SortSpec,
};

/// Bounded fixed-delay retry for catalog calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: defaults::CATALOG_ATTEMPTS,
            delay: Duration::from_millis(defaults::CATALOG_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Read `CATALOG_ATTEMPTS` and `CATALOG_RETRY_DELAY_MS`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            attempts: env_or("CATALOG_ATTEMPTS", defaults::CATALOG_ATTEMPTS)?,
            delay: Duration::from_millis(env_or(
                "CATALOG_RETRY_DELAY_MS",
                defaults::CATALOG_RETRY_DELAY_MS,
            )?),
        })
    }

    /// Single attempt, no delay.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy)]
pub struct ResultReconciler<'a> {
    store: &'a dyn GraphStore,
    directory: &'a dyn ResourceDirectory,
    retry: RetryPolicy,
}

impl<'a> ResultReconciler<'a> {
    pub fn new(
        store: &'a dyn GraphStore,
        directory: &'a dyn ResourceDirectory,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            retry,
        }
    }

    /// Ids confirmed visible by the catalog, in the catalog's order.
    ///
    /// The result is always a subset of `ids`. Transient failures are
    /// retried; once attempts run out the whole call fails.
    pub async fn existence_filter(&self, ids: &[String], env: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        let entries = loop {
            match self.directory.find_by_ids(ids, env).await {
                Ok(entries) => break entries,
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        subsystem = "catalog",
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Catalog call failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::DirectoryUnavailable(format!(
                        "gave up after {} attempts: {}",
                        attempts, e
                    )));
                }
                Err(e) => return Err(e),
            }
        };

        let requested: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let mut seen = BTreeSet::new();
        let confirmed: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.id)
            .filter(|id| requested.contains(id.as_str()) && seen.insert(id.clone()))
            .collect();

        debug!(
            subsystem = "catalog",
            requested = ids.len(),
            result_count = confirmed.len(),
            attempt,
            duration_ms = start.elapsed().as_millis() as u64,
            "Existence filter complete"
        );
        Ok(confirmed)
    }

    /// Datasets with at least one favourite in `application`, most first.
    pub async fn most_liked_datasets(&self, application: &str) -> Result<Vec<MetricCount>> {
        let counts = self.store.favourite_counts(Some(application), None).await?;
        let mut liked: Vec<MetricCount> = counts.into_iter().filter(|c| c.count >= 1).collect();
        sort_counts(&mut liked, SortDirection::Descending);
        Ok(liked)
    }

    /// Dataset ids ordered by `sort`; the whole population when
    /// `candidates` is `None`. Favourites count across all applications.
    pub async fn rank_by_secondary_metric(
        &self,
        sort: SortSpec,
        candidates: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let mut counts = match sort.metric {
            SortMetric::MostViewed => self.store.dataset_views(candidates).await?,
            SortMetric::MostFavorited => self.store.favourite_counts(None, candidates).await?,
        };
        sort_counts(&mut counts, sort.direction);
        debug!(
            sort = %sort,
            candidate_count = candidates.map(<[String]>::len),
            result_count = counts.len(),
            "Ranked by secondary metric"
        );
        Ok(counts.into_iter().map(|c| c.id).collect())
    }

    /// Datasets by view counter, existence-filtered, best first.
    pub async fn most_viewed(
        &self,
        application: &str,
        env: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<DatasetViews>> {
        let mut counts = self.store.dataset_views(None).await?;
        sort_counts(&mut counts, SortDirection::Descending);
        debug!(application, candidate_count = counts.len(), "Ranking most viewed");
        self.visible_views(counts, env, limit).await
    }

    /// Datasets `user_id` viewed in `application`, by that user's counter.
    pub async fn most_viewed_by_user(
        &self,
        user_id: &str,
        application: &str,
        env: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<DatasetViews>> {
        let mut counts = self.store.user_dataset_views(user_id, application).await?;
        sort_counts(&mut counts, SortDirection::Descending);
        self.visible_views(counts, env, limit).await
    }

    async fn visible_views(
        &self,
        ranked: Vec<MetricCount>,
        env: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<DatasetViews>> {
        let ids: Vec<String> = ranked.iter().map(|c| c.id.clone()).collect();
        let confirmed = self.existence_filter(&ids, env).await?;
        let mut rows: Vec<DatasetViews> = retain_confirmed(ranked, &confirmed, |c| &c.id)
            .into_iter()
            .map(|c| DatasetViews {
                dataset: c.id,
                views: c.count,
            })
            .collect();
        truncate(&mut rows, limit);
        Ok(rows)
    }
}

/// Keep the items of `ranked` whose key was confirmed, in ranked order.
pub fn retain_confirmed<T, F>(ranked: Vec<T>, confirmed: &[String], key: F) -> Vec<T>
where
    F: Fn(&T) -> &String,
{
    let confirmed: BTreeSet<&str> = confirmed.iter().map(String::as_str).collect();
    ranked
        .into_iter()
        .filter(|item| confirmed.contains(key(item).as_str()))
        .collect()
}

pub fn truncate<T>(rows: &mut Vec<T>, limit: Option<usize>) {
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
}

/// Sort by count in `direction`; ties always ascending by id.
fn sort_counts(counts: &mut [MetricCount], direction: SortDirection) {
    counts.sort_by(|a, b| {
        let by_count = match direction {
            SortDirection::Ascending => a.count.cmp(&b.count),
            SortDirection::Descending => b.count.cmp(&a.count),
        };
        by_count.then_with(|| a.id.cmp(&b.id))
    });
}
