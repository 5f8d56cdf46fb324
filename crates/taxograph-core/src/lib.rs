//! # taxograph-core
//!
//! Core types, traits, and abstractions for the taxograph engine.
//!
//! This crate provides the data model (concepts, resources, tags), the
//! store and catalog contracts the search engine is written against, and
//! the shared error type. It has no knowledge of any particular backend.

pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use cache::{Invalidation, GRAPH_DATASET, GRAPH_DEFAULT};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
