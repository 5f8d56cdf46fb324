//! Resource catalog clients.
//!
//! The catalog is the source of truth for which resources exist and are
//! visible in an environment. `HttpResourceDirectory` talks to the catalog
//! microservice; `StaticDirectory` is an in-process stand-in for the CLI's
//! seeded mode and for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use taxograph_core::config::{env_or, env_string};
use taxograph_core::{defaults, DirectoryEntry, Error, ResourceDirectory, Result};

/// Catalog endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::CATALOG_URL.to_string(),
            timeout: Duration::from_secs(defaults::CATALOG_TIMEOUT_SECS),
        }
    }
}

impl DirectoryConfig {
    /// Read `CATALOG_URL` and `CATALOG_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env_string("CATALOG_URL", defaults::CATALOG_URL),
            timeout: Duration::from_secs(env_or(
                "CATALOG_TIMEOUT_SECS",
                defaults::CATALOG_TIMEOUT_SECS,
            )?),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct FindByIdsRequest<'a> {
    ids: &'a [String],
}

#[derive(Deserialize)]
struct FindByIdsResponse {
    #[serde(default)]
    data: Vec<DirectoryEntry>,
}

/// HTTP client for `POST /dataset/find-by-ids`.
pub struct HttpResourceDirectory {
    client: Client,
    base_url: String,
}

impl HttpResourceDirectory {
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            subsystem = "catalog",
            base_url = %base_url,
            timeout_secs = config.timeout.as_secs(),
            "Initializing resource catalog client"
        );
        Ok(Self { client, base_url })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(DirectoryConfig::from_env()?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ResourceDirectory for HttpResourceDirectory {
    async fn find_by_ids(&self, ids: &[String], env: &[String]) -> Result<Vec<DirectoryEntry>> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/dataset/find-by-ids", self.base_url))
            .query(&[("env", env.join(","))])
            .json(&FindByIdsRequest { ids })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "catalog",
                status = status.as_u16(),
                "Catalog rejected find-by-ids"
            );
            let message = format!("catalog returned {}: {}", status, body);
            return Err(if status.is_server_error() {
                Error::DirectoryUnavailable(message)
            } else {
                Error::Request(message)
            });
        }

        let parsed: FindByIdsResponse = response.json().await?;
        debug!(
            subsystem = "catalog",
            requested = ids.len(),
            result_count = parsed.data.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "find-by-ids complete"
        );
        Ok(parsed.data)
    }
}

/// In-process catalog.
///
/// Either every id is visible or only a fixed list is, returned in list
/// order. Failures can be injected to exercise retry handling.
#[derive(Default)]
pub struct StaticDirectory {
    visible: Option<Vec<String>>,
    failures: Mutex<Vec<Error>>,
    calls: AtomicUsize,
}

impl StaticDirectory {
    /// Every requested id is visible, in request order.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Only `ids` are visible, in the given order.
    pub fn with_visible<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            visible: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Fail the next calls with these errors, in order.
    pub fn failing_with(self, errors: Vec<Error>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().rev().collect()),
            ..self
        }
    }

    /// Number of `find_by_ids` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceDirectory for StaticDirectory {
    async fn find_by_ids(&self, ids: &[String], _env: &[String]) -> Result<Vec<DirectoryEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures
            .lock()
            .map_err(|_| Error::Internal("directory lock poisoned".to_string()))?
            .pop();
        if let Some(err) = injected {
            return Err(err);
        }

        let entries = match &self.visible {
            None => ids.iter().map(DirectoryEntry::new).collect(),
            Some(visible) => visible
                .iter()
                .filter(|id| ids.contains(id))
                .map(DirectoryEntry::new)
                .collect(),
        };
        Ok(entries)
    }
}
