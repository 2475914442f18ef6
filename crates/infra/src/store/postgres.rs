//! Postgres-backed portal store.
//!
//! Multi-statement writes run inside one transaction; returning early with an
//! error drops the transaction, which rolls it back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (foreign key violation) | `23503` | `ConstraintViolation` | Unknown related id, or deleting a metric that still has evaluations |
//! | Database (unique violation) | `23505` | `ConstraintViolation` | Duplicate user email |
//! | Database (check constraint violation) | `23514` | `ConstraintViolation` | Invalid enum text |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Io / Tls / Other | N/A | `Backend` | Connectivity failures |
//!
//! Missing target rows are detected explicitly (`fetch_optional`, rows affected)
//! and reported as `NotFound`.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use govportal_core::{
    Comment, CommentId, CreateMetric, CreateMetricGroup, CreateProduct, CreateProject, DomainError,
    Evaluation, EvaluationId, EvaluationWithRefs, InternalProject, InternalProjectId, Metric,
    MetricGroup, MetricGroupId, MetricGroupWithMetrics, MetricId, MetricWithGroups, NewComment,
    NewEvaluation, NewUser, Product, ProductDetails, ProductFilter, ProductId, ProjectWithProducts,
    RelationWrite, ScoreSummary, SoftDelete, UpdateEvaluation, UpdateMetric, UpdateMetricGroup,
    UpdateProduct, UpdateProject, User, UserId,
};

use super::{PortalStore, SoftDeletion};
use crate::error::{StoreError, StoreResult};

const PRODUCT_COLS: &str = "p.id, p.name, p.description, p.links, p.status, p.is_deleted, p.deleted_at";
const METRIC_COLS: &str = "m.id, m.name, m.description, m.metric_type, m.min_score, m.max_score";
const GROUP_COLS: &str = "g.id, g.name, g.description";
const PROJECT_COLS: &str = "ip.id, ip.name, ip.description";
const EVALUATION_COLS: &str =
    "e.id, e.product_id, e.metric_id, e.score, e.comments, e.stakeholders, e.created_at";
const COMMENT_COLS: &str = "c.id, c.product_id, c.content, c.created_at";
const USER_COLS: &str = "u.id, u.email, u.name, u.created_at";

/// One side of a many-to-many join table, seen from the owning entity.
struct LinkTable {
    table: &'static str,
    owner_col: &'static str,
    member_col: &'static str,
    member_table: &'static str,
    member_entity: &'static str,
}

const PRODUCT_GROUPS: LinkTable = LinkTable {
    table: "product_metric_groups",
    owner_col: "product_id",
    member_col: "metric_group_id",
    member_table: "metric_groups",
    member_entity: "metric group",
};

const PRODUCT_PROJECTS: LinkTable = LinkTable {
    table: "product_internal_projects",
    owner_col: "product_id",
    member_col: "internal_project_id",
    member_table: "internal_projects",
    member_entity: "internal project",
};

const METRIC_GROUPS: LinkTable = LinkTable {
    table: "metric_group_metrics",
    owner_col: "metric_id",
    member_col: "metric_group_id",
    member_table: "metric_groups",
    member_entity: "metric group",
};

const GROUP_METRICS: LinkTable = LinkTable {
    table: "metric_group_metrics",
    owner_col: "metric_group_id",
    member_col: "metric_id",
    member_table: "metrics",
    member_entity: "metric",
};

const PROJECT_PRODUCTS: LinkTable = LinkTable {
    table: "product_internal_projects",
    owner_col: "internal_project_id",
    member_col: "product_id",
    member_table: "products",
    member_entity: "product",
};

/// Postgres-backed portal store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to share.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    /// Create a new PostgresStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn product_details(&self, products: Vec<Product>) -> StoreResult<Vec<ProductDetails>> {
        let ids = products.iter().map(|p| p.id.get()).collect::<Vec<_>>();

        let group_rows = sqlx::query(&format!(
            "SELECT pmg.product_id AS owner_id, {GROUP_COLS}
             FROM product_metric_groups pmg
             JOIN metric_groups g ON g.id = pmg.metric_group_id
             WHERE pmg.product_id = ANY($1)
             ORDER BY g.id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_groups", e))?;
        let mut groups = grouped(group_rows, group_from_row)?;

        let group_ids = groups
            .values()
            .flatten()
            .map(|g| g.id)
            .collect::<BTreeSet<_>>();
        let group_metrics = self.metrics_of_groups(&group_ids).await?;

        let project_rows = sqlx::query(&format!(
            "SELECT pip.product_id AS owner_id, {PROJECT_COLS}
             FROM product_internal_projects pip
             JOIN internal_projects ip ON ip.id = pip.internal_project_id
             WHERE pip.product_id = ANY($1)
             ORDER BY ip.id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_projects", e))?;
        let mut projects = grouped(project_rows, project_from_row)?;

        let evaluation_rows = sqlx::query(&format!(
            "SELECT e.product_id AS owner_id, {EVALUATION_COLS}
             FROM evaluations e
             WHERE e.product_id = ANY($1)
             ORDER BY e.created_at DESC, e.id DESC"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_evaluations", e))?;
        let mut evaluations = grouped(evaluation_rows, evaluation_from_row)?;

        let comment_rows = sqlx::query(&format!(
            "SELECT c.product_id AS owner_id, {COMMENT_COLS}
             FROM comments c
             WHERE c.product_id = ANY($1)
             ORDER BY c.created_at, c.id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_comments", e))?;
        let mut comments = grouped(comment_rows, comment_from_row)?;

        Ok(products
            .into_iter()
            .map(|product| {
                let key = product.id.get();
                let metric_groups = groups
                    .remove(&key)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|group| MetricGroupWithMetrics {
                        metrics: group_metrics.get(&group.id.get()).cloned().unwrap_or_default(),
                        group,
                    })
                    .collect();
                ProductDetails {
                    product,
                    metric_groups,
                    internal_projects: projects.remove(&key).unwrap_or_default(),
                    evaluations: evaluations.remove(&key).unwrap_or_default(),
                    comments: comments.remove(&key).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn metrics_of_groups(&self, group_ids: &BTreeSet<MetricGroupId>) -> StoreResult<BTreeMap<i64, Vec<Metric>>> {
        let ids = group_ids.iter().map(|g| g.get()).collect::<Vec<_>>();
        let rows = sqlx::query(&format!(
            "SELECT mgm.metric_group_id AS owner_id, {METRIC_COLS}
             FROM metric_group_metrics mgm
             JOIN metrics m ON m.id = mgm.metric_id
             WHERE mgm.metric_group_id = ANY($1)
             ORDER BY m.id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_group_metrics", e))?;
        grouped(rows, metric_from_row)
    }

    async fn with_refs(&self, evaluations: Vec<Evaluation>) -> StoreResult<Vec<EvaluationWithRefs>> {
        let product_ids = evaluations
            .iter()
            .map(|e| e.product_id.get())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let metric_ids = evaluations
            .iter()
            .map(|e| e.metric_id.get())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let products = sqlx::query(&format!("SELECT {PRODUCT_COLS} FROM products p WHERE p.id = ANY($1)"))
            .bind(&product_ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_evaluation_products", e))?
            .iter()
            .map(product_from_row)
            .map(|r| r.map(|p| (p.id, p)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(|e| map_sqlx_error("decode_product", e))?;
        let metrics = sqlx::query(&format!("SELECT {METRIC_COLS} FROM metrics m WHERE m.id = ANY($1)"))
            .bind(&metric_ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_evaluation_metrics", e))?
            .iter()
            .map(metric_from_row)
            .map(|r| r.map(|m| (m.id, m)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(|e| map_sqlx_error("decode_metric", e))?;

        evaluations
            .into_iter()
            .map(|evaluation| {
                let product = products.get(&evaluation.product_id).cloned().ok_or_else(|| {
                    StoreError::Backend(format!("evaluation {} references a missing product", evaluation.id))
                })?;
                let metric = metrics.get(&evaluation.metric_id).cloned().ok_or_else(|| {
                    StoreError::Backend(format!("evaluation {} references a missing metric", evaluation.id))
                })?;
                Ok(EvaluationWithRefs {
                    evaluation,
                    product,
                    metric,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl PortalStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<ProductDetails>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLS} FROM products p WHERE ($1 OR NOT p.is_deleted) ORDER BY p.id"
        ))
        .bind(filter.include_deleted)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        let products = decode_all(&rows, product_from_row)?;
        self.product_details(products).await
    }

    #[instrument(skip(self), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<ProductDetails> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLS} FROM products p WHERE p.id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?
            .ok_or_else(|| StoreError::not_found("product", id))?;
        let product = decode(&row, product_from_row)?;
        self.product_details(vec![product])
            .await?
            .pop()
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    #[instrument(skip(self, input), err)]
    async fn create_product(&self, input: CreateProduct) -> StoreResult<Product> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO products AS p (name, description, links, status)
             VALUES ($1, $2, $3, $4)
             RETURNING {PRODUCT_COLS}"
        ))
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.links)
        .bind(input.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        let product = decode(&row, product_from_row)?;

        if let Some(write) = RelationWrite::connect(input.metric_group_ids) {
            reconcile(&mut tx, &PRODUCT_GROUPS, product.id.get(), &write).await?;
        }
        if let Some(write) = RelationWrite::connect(input.internal_project_ids) {
            reconcile(&mut tx, &PRODUCT_PROJECTS, product.id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(product)
    }

    #[instrument(skip(self, input), err)]
    async fn update_product(&self, id: ProductId, input: UpdateProduct) -> StoreResult<Product> {
        let mut tx = self.begin().await?;
        let mut product = lock_row(&mut tx, "products p", PRODUCT_COLS, "p", id.get(), "product", product_from_row).await?;
        product.apply_update(&input);

        sqlx::query("UPDATE products SET name = $2, description = $3, links = $4, status = $5 WHERE id = $1")
            .bind(id.get())
            .bind(&product.name)
            .bind(&product.description)
            .bind(&product.links)
            .bind(product.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?;

        if let Some(write) = RelationWrite::set(input.metric_group_ids) {
            reconcile(&mut tx, &PRODUCT_GROUPS, id.get(), &write).await?;
        }
        if let Some(write) = RelationWrite::set(input.internal_project_ids) {
            reconcile(&mut tx, &PRODUCT_PROJECTS, id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(product)
    }

    #[instrument(skip(self), err)]
    async fn soft_delete_product(&self, id: ProductId, at: DateTime<Utc>) -> StoreResult<SoftDeletion> {
        let mut tx = self.begin().await?;
        let mut product = lock_row(&mut tx, "products p", PRODUCT_COLS, "p", id.get(), "product", product_from_row).await?;
        let outcome = product.soft_delete(at);
        if outcome == SoftDelete::Deleted {
            // Return the stored row: TIMESTAMPTZ keeps microseconds only.
            let row = sqlx::query(&format!(
                "UPDATE products AS p SET is_deleted = TRUE, deleted_at = $2 WHERE p.id = $1
                 RETURNING {PRODUCT_COLS}"
            ))
            .bind(id.get())
            .bind(product.deleted_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_product", e))?;
            product = decode(&row, product_from_row)?;
        }
        commit(tx).await?;
        Ok(SoftDeletion { outcome, product })
    }

    #[instrument(skip(self), err)]
    async fn list_metrics(&self) -> StoreResult<Vec<MetricWithGroups>> {
        let rows = sqlx::query(&format!("SELECT {METRIC_COLS} FROM metrics m ORDER BY m.id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_metrics", e))?;
        let metrics = decode_all(&rows, metric_from_row)?;
        let ids = metrics.iter().map(|m| m.id.get()).collect::<Vec<_>>();

        let group_rows = sqlx::query(&format!(
            "SELECT mgm.metric_id AS owner_id, {GROUP_COLS}
             FROM metric_group_metrics mgm
             JOIN metric_groups g ON g.id = mgm.metric_group_id
             WHERE mgm.metric_id = ANY($1)
             ORDER BY g.id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_metric_groups", e))?;
        let mut groups = grouped(group_rows, group_from_row)?;

        Ok(metrics
            .into_iter()
            .map(|metric| MetricWithGroups {
                groups: groups.remove(&metric.id.get()).unwrap_or_default(),
                metric,
            })
            .collect())
    }

    #[instrument(skip(self, input), err)]
    async fn create_metric(&self, input: CreateMetric) -> StoreResult<Metric> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO metrics AS m (name, description, metric_type, min_score, max_score)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {METRIC_COLS}"
        ))
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.metric_type.as_str())
        .bind(input.min_score)
        .bind(input.max_score)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_metric", e))?;
        let metric = decode(&row, metric_from_row)?;

        if let Some(write) = RelationWrite::connect(input.group_ids) {
            reconcile(&mut tx, &METRIC_GROUPS, metric.id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(metric)
    }

    #[instrument(skip(self, input), err)]
    async fn update_metric(&self, id: MetricId, input: UpdateMetric) -> StoreResult<Metric> {
        let mut tx = self.begin().await?;
        let metric = lock_row(&mut tx, "metrics m", METRIC_COLS, "m", id.get(), "metric", metric_from_row)
            .await?
            .merged(&input)?;

        sqlx::query(
            "UPDATE metrics SET name = $2, description = $3, metric_type = $4, min_score = $5, max_score = $6
             WHERE id = $1",
        )
        .bind(id.get())
        .bind(&metric.name)
        .bind(&metric.description)
        .bind(metric.metric_type.as_str())
        .bind(metric.min_score)
        .bind(metric.max_score)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_metric", e))?;

        if let Some(write) = RelationWrite::set(input.group_ids) {
            reconcile(&mut tx, &METRIC_GROUPS, id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(metric)
    }

    #[instrument(skip(self), err)]
    async fn delete_metric(&self, id: MetricId) -> StoreResult<()> {
        delete_row(&self.pool, "metrics", id.get(), "metric").await
    }

    async fn get_metric(&self, id: MetricId) -> StoreResult<Metric> {
        let row = sqlx::query(&format!("SELECT {METRIC_COLS} FROM metrics m WHERE m.id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_metric", e))?
            .ok_or_else(|| StoreError::not_found("metric", id))?;
        decode(&row, metric_from_row)
    }

    #[instrument(skip(self), err)]
    async fn list_metric_groups(&self) -> StoreResult<Vec<MetricGroupWithMetrics>> {
        let rows = sqlx::query(&format!("SELECT {GROUP_COLS} FROM metric_groups g ORDER BY g.id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_metric_groups", e))?;
        let groups = decode_all(&rows, group_from_row)?;
        let ids = groups.iter().map(|g| g.id).collect::<BTreeSet<_>>();
        let mut metrics = self.metrics_of_groups(&ids).await?;

        Ok(groups
            .into_iter()
            .map(|group| MetricGroupWithMetrics {
                metrics: metrics.remove(&group.id.get()).unwrap_or_default(),
                group,
            })
            .collect())
    }

    #[instrument(skip(self, input), err)]
    async fn create_metric_group(&self, input: CreateMetricGroup) -> StoreResult<MetricGroup> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO metric_groups AS g (name, description) VALUES ($1, $2) RETURNING {GROUP_COLS}"
        ))
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_metric_group", e))?;
        let group = decode(&row, group_from_row)?;

        if let Some(write) = RelationWrite::connect(input.metric_ids) {
            reconcile(&mut tx, &GROUP_METRICS, group.id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(group)
    }

    #[instrument(skip(self, input), err)]
    async fn update_metric_group(&self, id: MetricGroupId, input: UpdateMetricGroup) -> StoreResult<MetricGroup> {
        let mut tx = self.begin().await?;
        let mut group = lock_row(&mut tx, "metric_groups g", GROUP_COLS, "g", id.get(), "metric group", group_from_row).await?;
        group.apply_update(&input);

        sqlx::query("UPDATE metric_groups SET name = $2, description = $3 WHERE id = $1")
            .bind(id.get())
            .bind(&group.name)
            .bind(&group.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_metric_group", e))?;

        if let Some(write) = RelationWrite::set(input.metric_ids) {
            reconcile(&mut tx, &GROUP_METRICS, id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(group)
    }

    #[instrument(skip(self), err)]
    async fn delete_metric_group(&self, id: MetricGroupId) -> StoreResult<()> {
        delete_row(&self.pool, "metric_groups", id.get(), "metric group").await
    }

    #[instrument(skip(self), err)]
    async fn list_evaluations(&self) -> StoreResult<Vec<EvaluationWithRefs>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVALUATION_COLS} FROM evaluations e ORDER BY e.created_at DESC, e.id DESC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_evaluations", e))?;
        let evaluations = decode_all(&rows, evaluation_from_row)?;
        self.with_refs(evaluations).await
    }

    #[instrument(skip(self, input), err)]
    async fn create_evaluation(&self, input: NewEvaluation, at: DateTime<Utc>) -> StoreResult<Evaluation> {
        let mut tx = self.begin().await?;
        let evaluation = insert_evaluation(&mut tx, &input, at).await?;
        commit(tx).await?;
        Ok(evaluation)
    }

    #[instrument(skip(self, inputs), fields(batch_size = inputs.len()), err)]
    async fn create_evaluations(&self, inputs: Vec<NewEvaluation>, at: DateTime<Utc>) -> StoreResult<usize> {
        let mut tx = self.begin().await?;
        for input in &inputs {
            insert_evaluation(&mut tx, input, at).await?;
        }
        commit(tx).await?;
        Ok(inputs.len())
    }

    #[instrument(skip(self, input), err)]
    async fn update_evaluation(&self, id: EvaluationId, input: UpdateEvaluation) -> StoreResult<Evaluation> {
        let mut tx = self.begin().await?;
        let mut evaluation = lock_row(
            &mut tx,
            "evaluations e",
            EVALUATION_COLS,
            "e",
            id.get(),
            "evaluation",
            evaluation_from_row,
        )
        .await?;
        evaluation.apply_update(&input);

        sqlx::query(
            "UPDATE evaluations SET product_id = $2, metric_id = $3, score = $4, comments = $5, stakeholders = $6
             WHERE id = $1",
        )
        .bind(id.get())
        .bind(evaluation.product_id.get())
        .bind(evaluation.metric_id.get())
        .bind(evaluation.score)
        .bind(&evaluation.comments)
        .bind(&evaluation.stakeholders)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_evaluation", e))?;
        commit(tx).await?;
        Ok(evaluation)
    }

    #[instrument(skip(self), err)]
    async fn delete_evaluation(&self, id: EvaluationId) -> StoreResult<()> {
        delete_row(&self.pool, "evaluations", id.get(), "evaluation").await
    }

    #[instrument(skip(self), err)]
    async fn list_projects(&self) -> StoreResult<Vec<ProjectWithProducts>> {
        let rows = sqlx::query(&format!("SELECT {PROJECT_COLS} FROM internal_projects ip ORDER BY ip.id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_projects", e))?;
        let projects = decode_all(&rows, project_from_row)?;
        let ids = projects.iter().map(|p| p.id.get()).collect::<Vec<_>>();

        let product_rows = sqlx::query(&format!(
            "SELECT pip.internal_project_id AS owner_id, {PRODUCT_COLS}
             FROM product_internal_projects pip
             JOIN products p ON p.id = pip.product_id
             WHERE pip.internal_project_id = ANY($1)
             ORDER BY p.id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_project_products", e))?;
        let mut products = grouped(product_rows, product_from_row)?;

        Ok(projects
            .into_iter()
            .map(|project| ProjectWithProducts {
                products: products.remove(&project.id.get()).unwrap_or_default(),
                project,
            })
            .collect())
    }

    #[instrument(skip(self, input), err)]
    async fn create_project(&self, input: CreateProject) -> StoreResult<InternalProject> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO internal_projects AS ip (name, description) VALUES ($1, $2) RETURNING {PROJECT_COLS}"
        ))
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_project", e))?;
        let project = decode(&row, project_from_row)?;

        if let Some(write) = RelationWrite::connect(input.product_ids) {
            reconcile(&mut tx, &PROJECT_PRODUCTS, project.id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(project)
    }

    #[instrument(skip(self, input), err)]
    async fn update_project(&self, id: InternalProjectId, input: UpdateProject) -> StoreResult<InternalProject> {
        let mut tx = self.begin().await?;
        let mut project = lock_row(
            &mut tx,
            "internal_projects ip",
            PROJECT_COLS,
            "ip",
            id.get(),
            "internal project",
            project_from_row,
        )
        .await?;
        project.apply_update(&input);

        sqlx::query("UPDATE internal_projects SET name = $2, description = $3 WHERE id = $1")
            .bind(id.get())
            .bind(&project.name)
            .bind(&project.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_project", e))?;

        if let Some(write) = RelationWrite::set(input.product_ids) {
            reconcile(&mut tx, &PROJECT_PRODUCTS, id.get(), &write).await?;
        }
        commit(tx).await?;
        Ok(project)
    }

    #[instrument(skip(self), err)]
    async fn delete_project(&self, id: InternalProjectId) -> StoreResult<()> {
        delete_row(&self.pool, "internal_projects", id.get(), "internal project").await
    }

    #[instrument(skip(self, input), err)]
    async fn create_comment(&self, input: NewComment, at: DateTime<Utc>) -> StoreResult<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments AS c (product_id, content, created_at) VALUES ($1, $2, $3) RETURNING {COMMENT_COLS}"
        ))
        .bind(input.product_id.get())
        .bind(&input.content)
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_comment", e))?;
        decode(&row, comment_from_row)
    }

    #[instrument(skip(self), err)]
    async fn delete_comment(&self, id: CommentId) -> StoreResult<()> {
        delete_row(&self.pool, "comments", id.get(), "comment").await
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLS} FROM users u ORDER BY u.id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        decode_all(&rows, user_from_row)
    }

    #[instrument(skip(self, input), err)]
    async fn create_user(&self, input: NewUser, at: DateTime<Utc>) -> StoreResult<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users AS u (email, name, created_at) VALUES ($1, $2, $3) RETURNING {USER_COLS}"
        ))
        .bind(&input.email)
        .bind(&input.name)
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        decode(&row, user_from_row)
    }

    async fn count_products(&self, filter: ProductFilter) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE ($1 OR NOT is_deleted)")
            .bind(filter.include_deleted)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?;
        Ok(count as u64)
    }

    async fn count_evaluations(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluations")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_evaluations", e))?;
        Ok(count as u64)
    }

    async fn count_projects(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM internal_projects")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_projects", e))?;
        Ok(count as u64)
    }

    async fn score_summary(&self) -> StoreResult<ScoreSummary> {
        let row = sqlx::query("SELECT COUNT(*) AS count, COALESCE(SUM(score), 0)::BIGINT AS sum FROM evaluations")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("score_summary", e))?;
        let count: i64 = row.try_get("count").map_err(|e| map_sqlx_error("decode_score_summary", e))?;
        let sum: i64 = row.try_get("sum").map_err(|e| map_sqlx_error("decode_score_summary", e))?;
        Ok(ScoreSummary {
            count: count as u64,
            sum,
        })
    }

    async fn recent_evaluations(&self, limit: usize) -> StoreResult<Vec<EvaluationWithRefs>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVALUATION_COLS} FROM evaluations e ORDER BY e.created_at DESC, e.id DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_evaluations", e))?;
        let evaluations = decode_all(&rows, evaluation_from_row)?;
        self.with_refs(evaluations).await
    }
}

async fn commit(tx: Transaction<'static, Postgres>) -> StoreResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// `SELECT ... FOR UPDATE` one row by id, or `NotFound`.
async fn lock_row<T>(
    tx: &mut Transaction<'static, Postgres>,
    table: &str,
    cols: &str,
    alias: &str,
    id: i64,
    entity: &'static str,
    from_row: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<T> {
    let row = sqlx::query(&format!("SELECT {cols} FROM {table} WHERE {alias}.id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_row", e))?
        .ok_or_else(|| StoreError::not_found(entity, id))?;
    decode(&row, from_row)
}

async fn delete_row(pool: &PgPool, table: &str, id: i64, entity: &'static str) -> StoreResult<()> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("delete_row", e))?;
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

async fn insert_evaluation(
    tx: &mut Transaction<'static, Postgres>,
    input: &NewEvaluation,
    at: DateTime<Utc>,
) -> StoreResult<Evaluation> {
    let row = sqlx::query(&format!(
        "INSERT INTO evaluations AS e (product_id, metric_id, score, comments, stakeholders, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {EVALUATION_COLS}"
    ))
    .bind(input.product_id.get())
    .bind(input.metric_id.get())
    .bind(input.score)
    .bind(&input.comments)
    .bind(&input.stakeholders)
    .bind(at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_evaluation", e))?;
    decode(&row, evaluation_from_row)
}

/// Bring one owner's membership in `link` to the state requested by `write`.
///
/// Unknown member ids are reported before any row changes; the surrounding
/// transaction is then dropped by the caller.
async fn reconcile<Id>(
    tx: &mut Transaction<'static, Postgres>,
    link: &LinkTable,
    owner: i64,
    write: &RelationWrite<Id>,
) -> StoreResult<()>
where
    Id: Ord + Copy + From<i64> + Into<i64> + std::fmt::Display,
{
    let requested = write.ids().iter().map(|id| (*id).into()).collect::<Vec<i64>>();
    if !requested.is_empty() {
        let found: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE id = ANY($1)",
            link.member_table
        ))
        .bind(&requested)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_related_ids", e))?;
        let found = found.into_iter().collect::<BTreeSet<_>>();
        let missing = write.missing(|id| found.contains(&Into::<i64>::into(*id)));
        if !missing.is_empty() {
            return Err(StoreError::missing_related(link.member_entity, &missing));
        }
    }

    let current: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT {} FROM {} WHERE {} = $1",
        link.member_col, link.table, link.owner_col
    ))
    .bind(owner)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_membership", e))?;
    let current = current.into_iter().map(Id::from).collect::<BTreeSet<_>>();

    let plan = write.plan(&current);
    if plan.is_noop() {
        return Ok(());
    }
    tracing::debug!(
        table = link.table,
        owner,
        attach = plan.attach.len(),
        detach = plan.detach.len(),
        "reconciling membership"
    );

    if !plan.detach.is_empty() {
        let detach = plan.detach.iter().map(|id| (*id).into()).collect::<Vec<i64>>();
        sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = ANY($2)",
            link.table, link.owner_col, link.member_col
        ))
        .bind(owner)
        .bind(&detach)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("detach_members", e))?;
    }
    if !plan.attach.is_empty() {
        let attach = plan.attach.iter().map(|id| (*id).into()).collect::<Vec<i64>>();
        sqlx::query(&format!(
            "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
            link.table, link.owner_col, link.member_col
        ))
        .bind(owner)
        .bind(&attach)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("attach_members", e))?;
    }
    Ok(())
}

// Row decoding

fn decode<T>(row: &PgRow, from_row: fn(&PgRow) -> Result<T, sqlx::Error>) -> StoreResult<T> {
    from_row(row).map_err(|e| map_sqlx_error("decode_row", e))
}

fn decode_all<T>(rows: &[PgRow], from_row: fn(&PgRow) -> Result<T, sqlx::Error>) -> StoreResult<Vec<T>> {
    rows.iter().map(|row| decode(row, from_row)).collect()
}

/// Decode joined rows keyed by their `owner_id` column.
fn grouped<T>(
    rows: Vec<PgRow>,
    from_row: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<BTreeMap<i64, Vec<T>>> {
    let mut out: BTreeMap<i64, Vec<T>> = BTreeMap::new();
    for row in &rows {
        let owner: i64 = row
            .try_get("owner_id")
            .map_err(|e| map_sqlx_error("decode_owner_id", e))?;
        out.entry(owner).or_default().push(decode(row, from_row)?);
    }
    Ok(out)
}

fn parse_column<T: FromStr<Err = DomainError>>(raw: &str) -> Result<T, sqlx::Error> {
    raw.parse().map_err(|e: DomainError| sqlx::Error::Decode(Box::new(e)))
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        links: row.try_get("links")?,
        status: parse_column(&status)?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn metric_from_row(row: &PgRow) -> Result<Metric, sqlx::Error> {
    let metric_type: String = row.try_get("metric_type")?;
    Ok(Metric {
        id: MetricId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        metric_type: parse_column(&metric_type)?,
        min_score: row.try_get("min_score")?,
        max_score: row.try_get("max_score")?,
    })
}

fn group_from_row(row: &PgRow) -> Result<MetricGroup, sqlx::Error> {
    Ok(MetricGroup {
        id: MetricGroupId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

fn project_from_row(row: &PgRow) -> Result<InternalProject, sqlx::Error> {
    Ok(InternalProject {
        id: InternalProjectId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

fn evaluation_from_row(row: &PgRow) -> Result<Evaluation, sqlx::Error> {
    Ok(Evaluation {
        id: EvaluationId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        metric_id: MetricId::new(row.try_get("metric_id")?),
        score: row.try_get("score")?,
        comments: row.try_get("comments")?,
        stakeholders: row.try_get("stakeholders")?,
        created_at: row.try_get("created_at")?,
    })
}

fn comment_from_row(row: &PgRow) -> Result<Comment, sqlx::Error> {
    Ok(Comment {
        id: CommentId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Map SQLx errors to store errors by SQLSTATE code.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // foreign key, unique, check
                Some("23503") | Some("23505") | Some("23514") => StoreError::ConstraintViolation(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        sqlx::Error::RowNotFound => StoreError::Backend(format!("unexpected row not found in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
