//! PostgreSQL graph store.
//!
//! Hierarchy walks run one query per hop over the current frontier and keep
//! a visited set, so each concept is expanded at most once per call and
//! cyclic data terminates. Rows are decoded by column name.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument, trace};

use taxograph_core::{
    Concept, ConceptFilter, ConceptId, ConceptKind, ConceptUsage, Error, GraphStore, GraphWriter,
    MetricCount, ReachableConcept, ResourceRef, ResourceType, Result, TagPair, TagScope,
    TraversalDirection,
};

use crate::seed::GraphSeed;

/// One hop towards more general concepts.
const BROADER_STEP: &str = r#"
    SELECT DISTINCT r.parent_id AS concept_id
    FROM concept_relation r
    WHERE r.child_id = ANY($1)
"#;

/// One hop towards more specific concepts.
const NARROWER_STEP: &str = r#"
    SELECT DISTINCT r.child_id AS concept_id
    FROM concept_relation r
    WHERE r.parent_id = ANY($1)
"#;

/// PostgreSQL implementation of `GraphStore` and `GraphWriter`.
#[derive(Clone)]
pub struct PgGraphStore {
    pool: Pool<Postgres>,
}

impl PgGraphStore {
    /// Create a new PgGraphStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert every element of `seed`, merging with existing rows.
    pub async fn load_seed(&self, seed: &GraphSeed) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;

        for concept in &seed.concepts {
            let kinds: Vec<&str> = concept.kinds.iter().map(|k| k.as_str()).collect();
            sqlx::query(
                r#"
                INSERT INTO concept (id, label, synonyms, kinds)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE
                SET label = EXCLUDED.label, synonyms = EXCLUDED.synonyms, kinds = EXCLUDED.kinds
                "#,
            )
            .bind(&concept.id)
            .bind(&concept.label)
            .bind(&concept.synonyms)
            .bind(&kinds)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        for rel in &seed.relations {
            sqlx::query(
                "INSERT INTO concept_relation (child_id, parent_id, relation) VALUES ($1, $2, $3)
                 ON CONFLICT DO NOTHING",
            )
            .bind(&rel.child)
            .bind(&rel.parent)
            .bind(rel.relation.as_str())
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        let mut resources = seed.resources.clone();
        resources.sort_by_key(|r| r.resource.kind);
        for r in &resources {
            sqlx::query(
                r#"
                INSERT INTO resource (kind, id, parent_kind, parent_id, views)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (kind, id) DO UPDATE SET views = EXCLUDED.views
                "#,
            )
            .bind(r.resource.kind.as_str())
            .bind(&r.resource.id)
            .bind(r.parent.as_ref().map(|p| p.kind.as_str()))
            .bind(r.parent.as_ref().map(|p| p.id.as_str()))
            .bind(r.views)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        for tag in &seed.tags {
            sqlx::query(
                "INSERT INTO resource_tag (resource_kind, resource_id, concept_id, application)
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(tag.resource.kind.as_str())
            .bind(&tag.resource.id)
            .bind(&tag.concept)
            .bind(&tag.application)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        for fav in &seed.favourites {
            ensure_user(&mut tx, &fav.user).await?;
            sqlx::query(
                "INSERT INTO favourite (user_id, resource_kind, resource_id, application)
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(&fav.user)
            .bind(fav.resource.kind.as_str())
            .bind(&fav.resource.id)
            .bind(&fav.application)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        for view in &seed.user_views {
            ensure_user(&mut tx, &view.user).await?;
            sqlx::query(
                r#"
                INSERT INTO dataset_view (user_id, dataset_id, application, views)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, dataset_id, application) DO UPDATE SET views = EXCLUDED.views
                "#,
            )
            .bind(&view.user)
            .bind(&view.dataset)
            .bind(&view.application)
            .bind(view.views)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        tx.commit().await.map_err(Error::from_store)?;

        debug!(
            subsystem = "db",
            component = "graph_store",
            op = "load_seed",
            concepts = seed.concepts.len(),
            resources = seed.resources.len(),
            tags = seed.tags.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Loaded graph seed"
        );
        Ok(())
    }

    async fn require_concepts(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        concepts: &[ConceptId],
    ) -> Result<()> {
        let rows = sqlx::query("SELECT id FROM concept WHERE id = ANY($1)")
            .bind(concepts)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::from_store)?;
        let found: HashSet<String> = rows.into_iter().map(|r| r.get("id")).collect();
        let missing: Vec<&str> = concepts
            .iter()
            .filter(|c| !found.contains(*c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("concepts {}", missing.join(", "))))
        }
    }

    async fn require_resource(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        resource: &ResourceRef,
    ) -> Result<()> {
        let present: bool =
            sqlx::query("SELECT EXISTS(SELECT 1 FROM resource WHERE kind = $1 AND id = $2) AS present")
                .bind(resource.kind.as_str())
                .bind(&resource.id)
                .fetch_one(&mut **tx)
                .await
                .map_err(Error::from_store)?
                .get("present");
        if present {
            Ok(())
        } else {
            Err(Error::NotFound(resource.to_string()))
        }
    }

    async fn insert_tags(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_tag (resource_kind, resource_id, concept_id, application)
            SELECT $1, $2, c, $4 FROM UNNEST($3::TEXT[]) AS c
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(concepts)
        .bind(application)
        .execute(&mut **tx)
        .await
        .map_err(Error::from_store)?;
        Ok(())
    }
}

async fn ensure_user(tx: &mut sqlx::Transaction<'_, Postgres>, user_id: &str) -> Result<()> {
    sqlx::query("INSERT INTO app_user (id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::from_store)?;
    Ok(())
}

fn concept_from_row(row: &PgRow) -> Concept {
    let kinds: Vec<String> = row.get("kinds");
    Concept {
        id: row.get("id"),
        label: row.get("label"),
        synonyms: row.get("synonyms"),
        kinds: kinds.iter().filter_map(|k| k.parse().ok()).collect(),
    }
}

fn metric_from_row(row: &PgRow) -> MetricCount {
    MetricCount {
        id: row.get("id"),
        count: row.get("count"),
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    fn max_concurrency(&self) -> usize {
        self.pool.options().get_max_connections() as usize
    }

    async fn healthcheck(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::from_store)?;
        Ok(())
    }

    #[instrument(skip(self, from), fields(subsystem = "db", component = "graph_store", op = "reachable_within_hops", from_count = from.len()))]
    async fn reachable_within_hops(
        &self,
        from: &[ConceptId],
        direction: TraversalDirection,
        max_hops: Option<u32>,
    ) -> Result<Vec<ReachableConcept>> {
        if from.is_empty() || max_hops == Some(0) {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let sql = match direction {
            TraversalDirection::Broader => BROADER_STEP,
            TraversalDirection::Narrower => NARROWER_STEP,
        };

        let mut expanded: HashSet<ConceptId> = from.iter().cloned().collect();
        let mut frontier: Vec<ConceptId> = expanded.iter().cloned().collect();
        let mut reached: Vec<ReachableConcept> = Vec::new();
        let mut seen: HashSet<ConceptId> = HashSet::new();
        let mut hop = 0u32;

        while !frontier.is_empty() {
            if max_hops.is_some_and(|max| hop >= max) {
                break;
            }
            hop += 1;
            let rows = sqlx::query(sql)
                .bind(&frontier)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::from_store)?;

            let mut next = Vec::new();
            for row in rows {
                let concept_id: ConceptId = row.get("concept_id");
                if seen.insert(concept_id.clone()) {
                    reached.push(ReachableConcept {
                        concept_id: concept_id.clone(),
                        hops: hop,
                    });
                }
                if expanded.insert(concept_id.clone()) {
                    next.push(concept_id);
                }
            }
            trace!(hop, frontier = next.len(), "Expanded hierarchy frontier");
            frontier = next;
        }
        reached.sort_by(|a, b| a.concept_id.cmp(&b.concept_id));

        trace!(
            closure_size = reached.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Hierarchy walk complete"
        );
        Ok(reached)
    }

    async fn concepts_by_ids(&self, ids: &[ConceptId]) -> Result<Vec<Concept>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, label, synonyms, kinds FROM concept WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows.iter().map(concept_from_row).collect())
    }

    async fn list_concepts(
        &self,
        application: &str,
        filter: &ConceptFilter,
    ) -> Result<Vec<ConceptUsage>> {
        let kinds: Vec<&str> = filter.includes.iter().map(ConceptKind::as_str).collect();
        let rows = sqlx::query(
            r#"
            SELECT
                c.id,
                c.label,
                c.synonyms,
                c.kinds,
                COALESCE(
                    ARRAY_AGG(DISTINCT t.resource_id ORDER BY t.resource_id)
                        FILTER (WHERE t.resource_id IS NOT NULL),
                    '{}'
                ) AS datasets
            FROM concept c
            LEFT JOIN resource_tag t
                ON t.concept_id = c.id
                AND t.resource_kind = 'DATASET'
                AND t.application = $1
            WHERE CARDINALITY($2::TEXT[]) = 0 OR c.kinds && $2::TEXT[]
            GROUP BY c.id, c.label, c.synonyms, c.kinds
            ORDER BY c.id
            "#,
        )
        .bind(application)
        .bind(&kinds)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows
            .iter()
            .map(|row| {
                let datasets: Vec<String> = row.get("datasets");
                ConceptUsage {
                    concept: concept_from_row(row),
                    number_of_datasets_tagged: datasets.len() as i64,
                    datasets,
                }
            })
            // Substring search over synonyms is applied here rather than in SQL.
            .filter(|usage| filter.matches(&usage.concept))
            .collect())
    }

    async fn resources_tagged_with(
        &self,
        concepts: &[ConceptId],
        kind: ResourceType,
        application: &str,
    ) -> Result<Vec<String>> {
        if concepts.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT resource_id
            FROM resource_tag
            WHERE concept_id = ANY($1) AND resource_kind = $2 AND application = $3
            ORDER BY resource_id
            "#,
        )
        .bind(concepts)
        .bind(kind.as_str())
        .bind(application)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows.into_iter().map(|r| r.get("resource_id")).collect())
    }

    async fn tag_pairs(
        &self,
        concepts: &[ConceptId],
        kind: ResourceType,
        application: &str,
    ) -> Result<Vec<TagPair>> {
        if concepts.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT resource_id, concept_id
            FROM resource_tag
            WHERE concept_id = ANY($1) AND resource_kind = $2 AND application = $3
            ORDER BY resource_id, concept_id
            "#,
        )
        .bind(concepts)
        .bind(kind.as_str())
        .bind(application)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows
            .into_iter()
            .map(|r| TagPair {
                resource_id: r.get("resource_id"),
                concept_id: r.get("concept_id"),
            })
            .collect())
    }

    async fn tagged_concepts(
        &self,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<Vec<Concept>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.label, c.synonyms, c.kinds
            FROM resource_tag t
            JOIN concept c ON c.id = t.concept_id
            WHERE t.resource_kind = $1 AND t.resource_id = $2 AND t.application = $3
            ORDER BY c.id
            "#,
        )
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(application)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows.iter().map(concept_from_row).collect())
    }

    async fn resource_exists(&self, resource: &ResourceRef) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM resource WHERE kind = $1 AND id = $2) AS present",
        )
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from_store)?;
        Ok(row.get("present"))
    }

    async fn dataset_views(&self, candidates: Option<&[String]>) -> Result<Vec<MetricCount>> {
        let candidates: Option<Vec<String>> = candidates.map(<[String]>::to_vec);
        let rows = sqlx::query(
            r#"
            SELECT id, views AS count
            FROM resource
            WHERE kind = 'DATASET' AND ($1::TEXT[] IS NULL OR id = ANY($1))
            ORDER BY id
            "#,
        )
        .bind(candidates)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows.iter().map(metric_from_row).collect())
    }

    async fn favourite_counts(
        &self,
        application: Option<&str>,
        candidates: Option<&[String]>,
    ) -> Result<Vec<MetricCount>> {
        let candidates: Option<Vec<String>> = candidates.map(<[String]>::to_vec);
        let rows = sqlx::query(
            r#"
            SELECT r.id, COUNT(f.user_id) AS count
            FROM resource r
            LEFT JOIN favourite f
                ON f.resource_kind = r.kind
                AND f.resource_id = r.id
                AND ($1::TEXT IS NULL OR f.application = $1)
            WHERE r.kind = 'DATASET' AND ($2::TEXT[] IS NULL OR r.id = ANY($2))
            GROUP BY r.id
            ORDER BY r.id
            "#,
        )
        .bind(application)
        .bind(candidates)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows.iter().map(metric_from_row).collect())
    }

    async fn user_dataset_views(
        &self,
        user_id: &str,
        application: &str,
    ) -> Result<Vec<MetricCount>> {
        let rows = sqlx::query(
            r#"
            SELECT dataset_id AS id, views AS count
            FROM dataset_view
            WHERE user_id = $1 AND application = $2
            ORDER BY dataset_id
            "#,
        )
        .bind(user_id)
        .bind(application)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_store)?;

        Ok(rows.iter().map(metric_from_row).collect())
    }
}

#[async_trait]
impl GraphWriter for PgGraphStore {
    async fn create_resource(
        &self,
        resource: &ResourceRef,
        parent: Option<&ResourceRef>,
    ) -> Result<()> {
        crate::validate_parentage(resource, parent)?;
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;
        if let Some(parent) = parent {
            Self::require_resource(&mut tx, parent).await?;
        }
        sqlx::query(
            r#"
            INSERT INTO resource (kind, id, parent_kind, parent_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, id) DO NOTHING
            "#,
        )
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(parent.map(|p| p.kind.as_str()))
        .bind(parent.map(|p| p.id.as_str()))
        .execute(&mut *tx)
        .await
        .map_err(Error::from_store)?;
        tx.commit().await.map_err(Error::from_store)?;
        Ok(())
    }

    async fn delete_resource(&self, resource: &ResourceRef) -> Result<()> {
        // Children, tags, favourites and views go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM resource WHERE kind = $1 AND id = $2")
            .bind(resource.kind.as_str())
            .bind(&resource.id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_store)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(resource.to_string()));
        }
        Ok(())
    }

    async fn tag_resource(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;
        Self::require_resource(&mut tx, resource).await?;
        Self::require_concepts(&mut tx, concepts).await?;
        Self::insert_tags(&mut tx, resource, concepts, application).await?;
        tx.commit().await.map_err(Error::from_store)?;
        Ok(())
    }

    async fn replace_tags(
        &self,
        resource: &ResourceRef,
        concepts: &[ConceptId],
        application: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;
        Self::require_resource(&mut tx, resource).await?;
        Self::require_concepts(&mut tx, concepts).await?;

        sqlx::query(
            "DELETE FROM resource_tag WHERE resource_kind = $1 AND resource_id = $2 AND application = $3",
        )
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(application)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_store)?;

        Self::insert_tags(&mut tx, resource, concepts, application).await?;
        tx.commit().await.map_err(Error::from_store)?;
        Ok(())
    }

    async fn clear_tags(&self, resource: &ResourceRef, scope: &TagScope) -> Result<()> {
        let application = match scope {
            TagScope::Application(app) => Some(app.as_str()),
            TagScope::AllApplications => None,
        };
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;
        Self::require_resource(&mut tx, resource).await?;
        sqlx::query(
            r#"
            DELETE FROM resource_tag
            WHERE resource_kind = $1 AND resource_id = $2
              AND ($3::TEXT IS NULL OR application = $3)
            "#,
        )
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(application)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_store)?;
        tx.commit().await.map_err(Error::from_store)?;
        Ok(())
    }

    async fn add_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;
        Self::require_resource(&mut tx, resource).await?;
        ensure_user(&mut tx, user_id).await?;
        sqlx::query(
            "INSERT INTO favourite (user_id, resource_kind, resource_id, application)
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(application)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_store)?;
        tx.commit().await.map_err(Error::from_store)?;
        Ok(())
    }

    async fn remove_favourite(
        &self,
        user_id: &str,
        resource: &ResourceRef,
        application: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM favourite
            WHERE user_id = $1 AND resource_kind = $2 AND resource_id = $3 AND application = $4
            "#,
        )
        .bind(user_id)
        .bind(resource.kind.as_str())
        .bind(&resource.id)
        .bind(application)
        .execute(&self.pool)
        .await
        .map_err(Error::from_store)?;
        Ok(())
    }

    async fn record_view(
        &self,
        dataset_id: &str,
        user_id: Option<&str>,
        application: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_store)?;
        let result =
            sqlx::query("UPDATE resource SET views = views + 1 WHERE kind = 'DATASET' AND id = $1")
                .bind(dataset_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::from_store)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("DATASET {}", dataset_id)));
        }

        if let Some(user) = user_id {
            ensure_user(&mut tx, user).await?;
            sqlx::query(
                r#"
                INSERT INTO dataset_view (user_id, dataset_id, application, views)
                VALUES ($1, $2, $3, 1)
                ON CONFLICT (user_id, dataset_id, application)
                DO UPDATE SET views = dataset_view.views + 1
                "#,
            )
            .bind(user)
            .bind(dataset_id)
            .bind(application)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_store)?;
        }

        tx.commit().await.map_err(Error::from_store)?;
        Ok(())
    }
}
