//! Centralized default constants for taxograph.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the CLI reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// REQUEST PARAMETERS
// =============================================================================

/// Tenant used when a request does not name one.
pub const APPLICATION: &str = "rw";

/// Catalog environment used when a request does not name one.
pub const ENV: &str = "production";

/// Hierarchy expansion depth for multi-group search.
pub const SEARCH_DEPTH: i64 = 15;

/// Maximum number of concept groups in one search.
pub const MAX_CONCEPT_GROUPS: usize = 3;

/// Number of similar datasets returned when no limit is given.
pub const SIMILAR_LIMIT: usize = 3;

/// Hop bound used when matching descendants in hierarchy-aware similarity.
pub const SIMILARITY_MAX_HOPS: u32 = 15;

/// Concept kinds accepted by the concept listing `includes` filter.
pub const LISTABLE_KINDS: [&str; 4] = ["TOPIC", "DATA_TYPE", "TIME_PERIOD", "FREQUENCY"];

// =============================================================================
// STORE
// =============================================================================

/// Maximum connections in the store pool; also bounds in-request fan-out.
pub const STORE_MAX_CONNECTIONS: u32 = 10;

/// Connection attempts before the store is declared unavailable.
pub const STORE_CONNECT_ATTEMPTS: u32 = 10;

/// Fixed interval between store connection attempts.
pub const STORE_RETRY_INTERVAL_SECS: u64 = 2;

// =============================================================================
// RESOURCE CATALOG
// =============================================================================

/// Base URL of the resource catalog.
pub const CATALOG_URL: &str = "http://localhost:9000";

/// Per-request timeout for catalog calls.
pub const CATALOG_TIMEOUT_SECS: u64 = 30;

/// Catalog call attempts (first try included) before failing the request.
pub const CATALOG_ATTEMPTS: u32 = 3;

/// Fixed delay between catalog attempts.
pub const CATALOG_RETRY_DELAY_MS: u64 = 200;
