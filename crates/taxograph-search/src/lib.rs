//! # taxograph-search
//!
//! Concept-taxonomy search and dataset ranking for taxograph.
//!
//! This crate provides:
//! - Hierarchy expansion (`AncestorClosure`) and tenant-scoped tag access (`TagIndex`)
//! - Multi-group concept search with bounded-depth descendant matching
//! - Tag-based dataset similarity, direct or descendant-aware
//! - Reconciliation against the resource catalog and secondary-metric ranking
//! - `GraphQueryEngine`, the per-request pipeline tying these together
//!
//! Every algorithm is written against the `GraphStore` contract, so it runs
//! unchanged on PostgreSQL or on the in-memory store.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taxograph_search::{EngineConfig, GraphQueryEngine, HttpResourceDirectory, QueryParams};
//!
//! let engine = GraphQueryEngine::with_store(
//!     Arc::new(db.graph.clone()),
//!     Arc::new(HttpResourceDirectory::from_env()?),
//!     EngineConfig::from_env()?,
//! );
//! let ids = engine
//!     .search_dataset_ids(&[vec!["water".into()], vec!["drought".into()]], &QueryParams::default())
//!     .await?;
//! ```

pub mod closure;
pub mod concepts;
pub mod directory;
pub mod engine;
pub mod multi_group;
pub mod reconcile;
pub mod similarity;
pub mod tag_index;

#[cfg(test)]
mod test_support;

pub use closure::AncestorClosure;
pub use concepts::ConceptCatalogue;
pub use directory::{DirectoryConfig, HttpResourceDirectory, StaticDirectory};
pub use engine::{parse_sort, EngineConfig, GraphQueryEngine, QueryParams, QueryResponse};
pub use multi_group::{validate_depth, validate_groups, MultiGroupSearch};
pub use reconcile::{ResultReconciler, RetryPolicy};
pub use similarity::{SimilarityMode, SimilarityOptions, SimilarityRanker};
pub use tag_index::TagIndex;

// Re-export core types
pub use taxograph_core::{Error, Result};
