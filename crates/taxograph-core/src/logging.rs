//! Structured logging schema and field name constants for taxograph.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same field names in every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, retry or fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (candidate ids, rows) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID for one engine request. Format: UUIDv7.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "search", "db", "directory", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "multi_group", "similarity", "reconciler", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "similar", "existence_filter", "connect"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tenant scope of the request.
pub const APPLICATION: &str = "application";

/// Dataset id being operated on.
pub const DATASET_ID: &str = "dataset_id";

/// Hierarchy expansion depth.
pub const DEPTH: &str = "depth";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of candidates before reconciliation.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of concepts produced by a closure expansion.
pub const CLOSURE_SIZE: &str = "closure_size";

/// Attempt number of a retried operation (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
