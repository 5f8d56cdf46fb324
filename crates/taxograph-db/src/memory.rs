//! In-memory graph store.
//!
//! Implements the same `GraphStore` and `GraphWriter` contracts as the
//! PostgreSQL store, backed by ordered maps behind an `RwLock`. Used by the
//! search crate's tests and by the CLI when it runs against a JSON fixture
//! instead of a database.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, trace};

use taxograph_core::{
    defaults, Concept, ConceptFilter, ConceptId, ConceptUsage, Error, GraphStore, GraphWriter,
    MetricCount, ReachableConcept, ResourceRef, ResourceType, Result, TagPair, TagScope,
    TraversalDirection,
};

use crate::seed::GraphSeed;

#[derive(Debug, Clone, Default)]
struct ResourceNode {
    parent: Option<ResourceRef>,
    views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TagKey {
    resource: ResourceRef,
    concept: ConceptId,
    application: String,
}

#[derive(Debug, Default)]
struct State {
    concepts: BTreeMap<ConceptId, Concept>,
    /// child -> more general concepts
    broader: HashMap<ConceptId, BTreeSet<ConceptId>>,
    /// parent -> more specific concepts
    narrower: HashMap<ConceptId, BTreeSet<ConceptId>>,
    resources: BTreeMap<ResourceRef, ResourceNode>,
    tags: BTreeSet<TagKey>,
    /// (user, resource, application)
    favourites: BTreeSet<(String, ResourceRef, String)>,
    /// (user, dataset, application) -> views
    user_views: BTreeMap<(String, String, String), i64>,
}

impl State {
    fn require_resource(&self, resource: &ResourceRef) -> Result<()> {
        if self.resources.contains_key(resource) {
            Ok(())
        } else {
            Err(Error::NotFound(resource.to_string()))
        }
    }

    fn require_concepts(&self, concepts: &[ConceptId]) -> Result<()> {
        let missing: Vec<&str> = concepts
            .iter()
            .filter(|c| !self.concepts.contains_key(*c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("concepts {}", missing.join(", "))))
        }
    }

    /// The resource plus everything that transitively belongs to it.
    fn subtree(&self, root: &ResourceRef) -> BTreeSet<ResourceRef> {
        let mut members = BTreeSet::new();
        members.insert(root.clone());
        loop {
            let added: Vec<ResourceRef> = self
                .resources
                .iter()
                .filter(|(r, node)| {
                    !members.contains(*r)
                        && node.parent.as_ref().is_some_and(|p| members.contains(p))
                })
                .map(|(r, _)| r.clone())
                .collect();
            if added.is_empty() {
                return members;
            }
            members.extend(added);
        }
    }
}

/// Graph store held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<State>,
    offline: AtomicBool,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store populated from a fixture.
    pub fn from_seed(seed: &GraphSeed) -> Result<Self> {
        let store = Self::new();
        store.apply_seed(seed)?;
        Ok(store)
    }

    /// Add every element of `seed`. Referenced concepts and resources must
    /// exist in the store or earlier in the seed.
    pub fn apply_seed(&self, seed: &GraphSeed) -> Result<()> {
        let mut state = self.write()?;

        for concept in &seed.concepts {
            state.concepts.insert(concept.id.clone(), concept.clone());
        }
        for rel in &seed.relations {
            state.require_concepts(&[rel.child.clone(), rel.parent.clone()])?;
            insert_edge(&mut state, &rel.child, &rel.parent);
        }

        let mut resources = seed.resources.clone();
        resources.sort_by_key(|r| r.resource.kind);
        for r in &resources {
            if let Some(parent) = &r.parent {
                state.require_resource(parent)?;
            }
            state.resources.insert(
                r.resource.clone(),
                ResourceNode {
                    parent: r.parent.clone(),
                    views: r.views,
                },
            );
        }

        for tag in &seed.tags {
            state.require_resource(&tag.resource)?;
            state.require_concepts(std::slice::from_ref(&tag.concept))?;
            state.tags.insert(TagKey {
                resource: tag.resource.clone(),
                concept: tag.concept.clone(),
                application: tag.application.clone(),
            });
        }
        for fav in &seed.favourites {
            state.require_resource(&fav.resource)?;
            state.favourites.insert((
                fav.user.clone(),
                fav.resource.clone(),
                fav.application.clone(),
            ));
        }
        for view in &seed.user_views {
            state.require_resource(&ResourceRef::dataset(&view.dataset))?;
            state.user_views.insert(
                (
                    view.user.clone(),
                    view.dataset.clone(),
                    view.application.clone(),
                ),
                view.views,
            );
        }

        debug!(
            subsystem = "db",
            component = "memory_store",
            op = "seed",
            concepts = state.concepts.len(),
            resources = state.resources.len(),
            tags = state.tags.len(),
            "Applied graph seed"
        );
        Ok(())
    }

    /// Simulate a lost connection: every call fails with `StoreUnavailable`
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.check_online()?;
        self.state
            .read()
            .map_err(|_| Error::Internal("graph state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.check_online()?;
        self.state
            .write()
            .map_err(|_| Error::Internal("graph state lock poisoned".to_string()))
    }
}

fn insert_edge(state: &mut State, child: &str, parent: &str) {
    state
        .broader
        .entry(child.to_string())
        .or_default()
        .insert(parent.to_string());
    state
        .narrower
        .entry(parent.to_string())
        .or_default()
        .insert(child.to_string());
}

/// Breadth-first expansion from `from`, recording each concept once with
/// the hop at which it was first reached.
///
/// Every concept is expanded at most once, so shared ancestors are not
/// re-traversed and cycles terminate. Start concepts are only reported if
/// some walk leads back to them.
fn expand(
    adjacency: &HashMap<ConceptId, BTreeSet<ConceptId>>,
    from: &[ConceptId],
    max_hops: Option<u32>,
) -> Vec<ReachableConcept> {
    let mut expanded: HashSet<&str> = from.iter().map(String::as_str).collect();
    let mut frontier: Vec<&str> = expanded.iter().copied().collect();
    let mut reached: BTreeMap<&str, u32> = BTreeMap::new();
    let mut hop = 0u32;

    while !frontier.is_empty() {
        if max_hops.is_some_and(|max| hop >= max) {
            break;
        }
        hop += 1;
        let mut next = Vec::new();
        for concept in frontier {
            let Some(neighbours) = adjacency.get(concept) else {
                continue;
            };
            for n in neighbours {
                reached.entry(n.as_str()).or_insert(hop);
                if expanded.insert(n.as_str()) {
                    next.push(n.as_str());
                }
            }
        }
        trace!(hop, frontier = next.len(), "Expanded hierarchy frontier");
        frontier = next;
    }

    reached
        .into_iter()
        .map(|(id, hops)| ReachableConcept {
            concept_id: id.to_string(),
            hops,
        })
        .collect()
}

fn filter_candidates(counts: Vec<MetricCount>, candidates: Option<&[String]>) -> Vec<MetricCount> {
    match candidates {
        Some(ids) => {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            counts
                .into_iter()
                .filter(|m| wanted.contains(m.id.as_str()))
                .collect()
        }
        None => counts,
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn max_concurrency(&self) -> usize {
        defaults::STORE_MAX_CONNECTIONS as usize
    }

    async fn healthcheck(&self) -> Result<()> {
        self.read().map(|_| ())
    }

    async fn reachable_within_hops(
        &self,
        from: &[ConceptId],
        direction: TraversalDirection,
        max_hops: Option<u32>,
    ) -> Result<Vec<ReachableConcept>> {
        let state = self.read()?;
        let adjacency = match direction {
            TraversalDirection::Broader => &state.broader,
            TraversalDirection::Narrower => &state.narrower,
        };
        Ok(expand(adjacency, from, max_hops))
    }

    async fn concepts_by_ids(&self, ids: &[ConceptId]) -> Result<Vec<Concept>> {
        let state = self.read()?;
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.concepts.get(id).cloned())
            .collect())
    }

    async fn list_concepts(
        &self,
        application: &str,
        filter: &ConceptFilter,
    ) -> Result<Vec<ConceptUsage>> {
        let state = self.read()?;
        Ok(state
            .concepts
            .values()
            .filter(|c| filter.matches(c))
            .map(|concept| {
                let datasets: BTreeSet<String> = state
                    .tags
                    .iter()
                    .filter(|t| {
                        t.concept == concept.id
                            && t.application == application
                            && t.resource.kind == ResourceType::Dataset
                    })
                    .map(|t| t.resource.id.clone())
                    .collect();
                ConceptUsage {
                    concept: concept.clone(),
                    number_of_datasets_tagged: datasets.len() as i64,
                    datasets: datasets.into_iter().collect(),
                }
            })
            .collect())
    }

    async fn resources_tagged_with(
        &self,
        concepts: &[ConceptId],
        kind: ResourceType,
        application: &str,
    ) -> Result<Vec<String>> {
        let pairs = self.tag_pairs(concepts, kind, application).await?;
        let ids: BTreeSet<String> = pairs.into_iter().map(|p| p.resource_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn tag_pairs(
        &self,
        concepts: &[ConceptId],
        kind: ResourceType,
        application: &str,
    ) -> Result<Vec<TagPair>> {
        let state = self.read()?;
        let wanted: HashSet<&str> = concepts.iter().map(String::as_str).collect();
        let pairs: BTreeSet<TagPair> = state
            .tags
            .iter()
            .filter(|t| {
                t.resource.kind == kind
                    && t.application == application
                    && wanted.contains(t.concept.as_str())
            })
            .map(|t| TagPair {
                resource_id: t.resource.id.clone(),
                concept_id: t.concept.clone(),
            })
            .collect();
        Ok(pairs.into_iter().collect())
    }

    async fn tagged_concepts(
        &self,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<Vec<Concept>> {
        let state = self.read()?;
        Ok(state
            .tags
            .iter()
            .filter(|t| &t.resource == resource && t.application == application)
            .filter_map(|t| state.concepts.get(&t.concept).cloned())
            .collect())
    }

    async fn resource_exists(&self, resource: &ResourceRef) -> Result<bool> {
        Ok(self.read()?.resources.contains_key(resource))
    }

    async fn dataset_views(&self, candidates: Option<&[String]>) -> Result<Vec<MetricCount>> {
        let state = self.read()?;
        let counts = state
            .resources
            .iter()
            .filter(|(r, _)| r.kind == ResourceType::Dataset)
            .map(|(r, node)| MetricCount::new(&r.id, node.views))
            .collect();
        Ok(filter_candidates(counts, candidates))
    }

    async fn favourite_counts(
        &self,
        application: Option<&str>,
        candidates: Option<&[String]>,
    ) -> Result<Vec<MetricCount>> {
        let state = self.read()?;
        let counts = state
            .resources
            .keys()
            .filter(|r| r.kind == ResourceType::Dataset)
            .map(|dataset| {
                let count = state
                    .favourites
                    .iter()
                    .filter(|(_, r, app)| {
                        r == dataset && application.map_or(true, |a| a == app.as_str())
                    })
                    .count();
                MetricCount::new(&dataset.id, count as i64)
            })
            .collect();
        Ok(filter_candidates(counts, candidates))
    }

    async fn user_dataset_views(
        &self,
        user_id: &str,
        application: &str,
    ) -> Result<Vec<MetricCount>> {
        let state = self.read()?;
        Ok(state
            .user_views
            .iter()
            .filter(|((user, _, app), _)| user == user_id && app == application)
            .map(|((_, dataset, _), views)| MetricCount::new(dataset, *views))
            .collect())
    }
}

#[async_trait]
impl GraphWriter for InMemoryGraphStore {
    async fn create_resource(
        &self,
        resource: &ResourceRef,
        parent: Option<&ResourceRef>,
    ) -> Result<()> {
        crate::validate_parentage(resource, parent)?;
        let mut state = self.write()?;
        if let Some(parent) = parent {
            state.require_resource(parent)?;
        }
        state
            .resources
            .entry(resource.clone())
            .or_insert_with(|| ResourceNode {
                parent: parent.cloned(),
                views: 0,
            });
        Ok(())
    }

    async fn delete_resource(&self, resource: &ResourceRef) -> Result<()> {
        let mut state = self.write()?;
        state.require_resource(resource)?;
        let doomed = state.subtree(resource);
        state.resources.retain(|r, _| !doomed.contains(r));
        state.tags.retain(|t| !doomed.contains(&t.resource));
        state.favourites.retain(|(_, r, _)| !doomed.contains(r));
        state.user_views.retain(|(_, dataset, _), _| {
            !doomed.contains(&ResourceRef::dataset(dataset.as_str()))
        });
        debug!(
            subsystem = "db",
            component = "memory_store",
            op = "delete_resource",
            removed = doomed.len(),
            "Deleted resource subtree"
        );
        Ok(())
    }

    async fn tag_resource(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.require_resource(resource)?;
        state.require_concepts(concepts)?;
        for concept in concepts {
            state.tags.insert(TagKey {
                resource: resource.clone(),
                concept: concept.clone(),
                application: application.to_string(),
            });
        }
        Ok(())
    }

    async fn replace_tags(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.require_resource(resource)?;
        state.require_concepts(concepts)?;
        state
            .tags
            .retain(|t| !(&t.resource == resource && t.application == application));
        for concept in concepts {
            state.tags.insert(TagKey {
                resource: resource.clone(),
                concept: concept.clone(),
                application: application.to_string(),
            });
        }
        Ok(())
    }

    async fn clear_tags(&self, resource: &ResourceRef, scope: &TagScope) -> Result<()> {
        let mut state = self.write()?;
        state.require_resource(resource)?;
        state.tags.retain(|t| {
            &t.resource != resource
                || match scope {
                    TagScope::Application(app) => &t.application != app,
                    TagScope::AllApplications => false,
                }
        });
        Ok(())
    }

    async fn add_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.require_resource(resource)?;
        state.favourites.insert((
            user_id.to_string(),
            resource.clone(),
            application.to_string(),
        ));
        Ok(())
    }

    async fn remove_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.favourites.remove(&(
            user_id.to_string(),
            resource.clone(),
            application.to_string(),
        ));
        Ok(())
    }

    async fn record_view(
        &self,
        dataset_id: &str,
        user_id: Option<&str>,
        application: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        let node = state
            .resources
            .get_mut(&ResourceRef::dataset(dataset_id))
            .ok_or_else(|| Error::NotFound(format!("DATASET {}", dataset_id)))?;
        node.views += 1;
        if let Some(user) = user_id {
            *state
                .user_views
                .entry((
                    user.to_string(),
                    dataset_id.to_string(),
                    application.to_string(),
                ))
                .or_insert(0) += 1;
        }
        Ok(())
    }
}
