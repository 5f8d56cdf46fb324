//! Cache bucket names shared with the external caching layer.
//!
//! Reads advertise the bucket their response may be cached under; writes
//! return the buckets that must be dropped. Nothing here holds state.

use serde::Serialize;

use crate::models::{ResourceRef, ResourceType};

/// Bucket for dataset-centric reads (search, similarity, rankings).
pub const GRAPH_DATASET: &str = "graph-dataset";

/// Bucket for concept-centric reads (listings, inference).
pub const GRAPH_DEFAULT: &str = "graph-default";

/// Buckets to invalidate after a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Invalidation {
    pub buckets: Vec<String>,
}

impl Invalidation {
    pub fn none() -> Self {
        Self::default()
    }

    /// Creating or deleting a resource drops its type buckets and its own.
    pub fn for_resource(resource: &ResourceRef) -> Self {
        let kind = kind_slug(resource.kind);
        Self {
            buckets: vec![
                format!("graph-{}", kind),
                format!("{}-graph", kind),
                resource_bucket(&resource.id),
            ],
        }
    }

    /// Adding tags changes dataset search results, whatever was tagged.
    pub fn for_tags_added(resource: &ResourceRef) -> Self {
        Self::for_dataset(&resource.id)
    }

    /// Replacing or clearing tags only drops the resource's own bucket.
    pub fn for_tags_replaced(resource: &ResourceRef) -> Self {
        Self {
            buckets: vec![resource_bucket(&resource.id)],
        }
    }

    /// Dataset-level change (views, creation).
    pub fn for_dataset(dataset_id: &str) -> Self {
        Self {
            buckets: vec![
                GRAPH_DATASET.to_string(),
                "dataset-graph".to_string(),
                resource_bucket(dataset_id),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Space-separated form used in the `uncache` response header.
    pub fn header_value(&self) -> String {
        self.buckets.join(" ")
    }
}

fn resource_bucket(id: &str) -> String {
    format!("{}-graph", id)
}

fn kind_slug(kind: ResourceType) -> String {
    kind.as_str().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_added_invalidates_dataset_buckets() {
        let inv = Invalidation::for_tags_added(&ResourceRef::dataset("d1"));
        assert_eq!(inv.header_value(), "graph-dataset dataset-graph d1-graph");
    }

    #[test]
    fn test_tags_replaced_invalidates_only_resource_bucket() {
        let widget = ResourceRef::new(ResourceType::Widget, "w1");
        assert_eq!(Invalidation::for_tags_replaced(&widget).buckets, vec!["w1-graph"]);
    }

    #[test]
    fn test_resource_buckets_use_lowercase_kind() {
        let layer = ResourceRef::new(ResourceType::Layer, "l9");
        assert_eq!(
            Invalidation::for_resource(&layer).header_value(),
            "graph-layer layer-graph l9-graph"
        );
    }

    #[test]
    fn test_none_is_empty() {
        assert!(Invalidation::none().is_empty());
        assert_eq!(Invalidation::none().header_value(), "");
    }
}
