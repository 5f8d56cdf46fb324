//! Declarative graph fixtures.
//!
//! A `GraphSeed` describes concepts, hierarchy edges, resources, tags,
//! favourites and views. It is loaded from JSON by the CLI and built in code
//! by tests, then applied to either store implementation.

use serde::Deserialize;

use taxograph_core::{Concept, ConceptId, HierarchyRelation, ResourceRef, Result};

/// Hierarchy edge from a specific concept to a more general one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedRelation {
    pub child: ConceptId,
    pub parent: ConceptId,
    pub relation: HierarchyRelation,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedResource {
    #[serde(flatten)]
    pub resource: ResourceRef,
    #[serde(default)]
    pub parent: Option<ResourceRef>,
    /// Initial dataset view counter.
    #[serde(default)]
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedTag {
    #[serde(flatten)]
    pub resource: ResourceRef,
    pub concept: ConceptId,
    pub application: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedFavourite {
    pub user: String,
    #[serde(flatten)]
    pub resource: ResourceRef,
    pub application: String,
}

/// Per-user dataset view counter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedUserView {
    pub user: String,
    pub dataset: String,
    pub application: String,
    pub views: i64,
}

/// Complete graph fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GraphSeed {
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub relations: Vec<SeedRelation>,
    #[serde(default)]
    pub resources: Vec<SeedResource>,
    #[serde(default)]
    pub tags: Vec<SeedTag>,
    #[serde(default)]
    pub favourites: Vec<SeedFavourite>,
    #[serde(default)]
    pub user_views: Vec<SeedUserView>,
}

impl GraphSeed {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn concept(mut self, concept: Concept) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn relation(mut self, child: &str, parent: &str, relation: HierarchyRelation) -> Self {
        self.relations.push(SeedRelation {
            child: child.to_string(),
            parent: parent.to_string(),
            relation,
        });
        self
    }

    pub fn resource(mut self, resource: ResourceRef, parent: Option<ResourceRef>) -> Self {
        self.resources.push(SeedResource {
            resource,
            parent,
            views: 0,
        });
        self
    }

    /// Dataset with an initial view counter.
    pub fn dataset(mut self, id: &str, views: i64) -> Self {
        self.resources.push(SeedResource {
            resource: ResourceRef::dataset(id),
            parent: None,
            views,
        });
        self
    }

    pub fn tag(mut self, resource: ResourceRef, concept: &str, application: &str) -> Self {
        self.tags.push(SeedTag {
            resource,
            concept: concept.to_string(),
            application: application.to_string(),
        });
        self
    }

    pub fn favourite(mut self, user: &str, resource: ResourceRef, application: &str) -> Self {
        self.favourites.push(SeedFavourite {
            user: user.to_string(),
            resource,
            application: application.to_string(),
        });
        self
    }

    pub fn user_view(mut self, user: &str, dataset: &str, application: &str, views: i64) -> Self {
        self.user_views.push(SeedUserView {
            user: user.to_string(),
            dataset: dataset.to_string(),
            application: application.to_string(),
            views,
        });
        self
    }
}
