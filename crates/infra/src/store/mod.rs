//! Entity store abstraction and its backends.
//!
//! Every operation is a self-contained unit of work: multi-row writes
//! (entity + relation memberships, evaluation batches) either fully apply or
//! leave the store untouched. Timestamps are passed in by the caller so that
//! the store itself stays deterministic under test.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use govportal_core::{
    Comment, CommentId, CreateMetric, CreateMetricGroup, CreateProduct, CreateProject, Evaluation,
    EvaluationId, EvaluationWithRefs, InternalProject, InternalProjectId, Metric, MetricGroup,
    MetricGroupId, MetricGroupWithMetrics, MetricId, MetricWithGroups, NewComment, NewEvaluation,
    NewUser, Product, ProductDetails, ProductFilter, ProductId, ProjectWithProducts, ScoreSummary,
    SoftDelete, UpdateEvaluation, UpdateMetric, UpdateMetricGroup, UpdateProduct, UpdateProject,
    User,
};

use crate::error::StoreResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Outcome of a product soft-delete, with the product as it now stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftDeletion {
    pub outcome: SoftDelete,
    pub product: Product,
}

/// Persisted entities and their associations.
#[async_trait::async_trait]
pub trait PortalStore: Send + Sync {
    // Products

    async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<ProductDetails>>;

    /// Fetch one product with relations. Soft-deleted products are returned too.
    async fn get_product(&self, id: ProductId) -> StoreResult<ProductDetails>;

    async fn create_product(&self, input: CreateProduct) -> StoreResult<Product>;

    async fn update_product(&self, id: ProductId, input: UpdateProduct) -> StoreResult<Product>;

    async fn soft_delete_product(&self, id: ProductId, at: DateTime<Utc>) -> StoreResult<SoftDeletion>;

    // Metrics and groups

    async fn list_metrics(&self) -> StoreResult<Vec<MetricWithGroups>>;

    async fn create_metric(&self, input: CreateMetric) -> StoreResult<Metric>;

    async fn update_metric(&self, id: MetricId, input: UpdateMetric) -> StoreResult<Metric>;

    /// Fails with a constraint violation while evaluations still reference the metric.
    async fn delete_metric(&self, id: MetricId) -> StoreResult<()>;

    async fn get_metric(&self, id: MetricId) -> StoreResult<Metric>;

    async fn list_metric_groups(&self) -> StoreResult<Vec<MetricGroupWithMetrics>>;

    async fn create_metric_group(&self, input: CreateMetricGroup) -> StoreResult<MetricGroup>;

    async fn update_metric_group(&self, id: MetricGroupId, input: UpdateMetricGroup) -> StoreResult<MetricGroup>;

    async fn delete_metric_group(&self, id: MetricGroupId) -> StoreResult<()>;

    // Evaluations

    /// All evaluations, newest first.
    async fn list_evaluations(&self) -> StoreResult<Vec<EvaluationWithRefs>>;

    async fn create_evaluation(&self, input: NewEvaluation, at: DateTime<Utc>) -> StoreResult<Evaluation>;

    /// Insert every element or none of them. Returns the number of rows created.
    async fn create_evaluations(&self, inputs: Vec<NewEvaluation>, at: DateTime<Utc>) -> StoreResult<usize>;

    async fn update_evaluation(&self, id: EvaluationId, input: UpdateEvaluation) -> StoreResult<Evaluation>;

    async fn delete_evaluation(&self, id: EvaluationId) -> StoreResult<()>;

    // Internal projects

    async fn list_projects(&self) -> StoreResult<Vec<ProjectWithProducts>>;

    async fn create_project(&self, input: CreateProject) -> StoreResult<InternalProject>;

    async fn update_project(&self, id: InternalProjectId, input: UpdateProject) -> StoreResult<InternalProject>;

    async fn delete_project(&self, id: InternalProjectId) -> StoreResult<()>;

    // Comments and users

    async fn create_comment(&self, input: NewComment, at: DateTime<Utc>) -> StoreResult<Comment>;

    async fn delete_comment(&self, id: CommentId) -> StoreResult<()>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn create_user(&self, input: NewUser, at: DateTime<Utc>) -> StoreResult<User>;

    // Aggregates

    async fn count_products(&self, filter: ProductFilter) -> StoreResult<u64>;

    async fn count_evaluations(&self) -> StoreResult<u64>;

    async fn count_projects(&self) -> StoreResult<u64>;

    async fn score_summary(&self) -> StoreResult<ScoreSummary>;

    /// Up to `limit` evaluations, newest first.
    async fn recent_evaluations(&self, limit: usize) -> StoreResult<Vec<EvaluationWithRefs>>;
}

/// Shared store handle injected into the HTTP layer.
pub type SharedStore = Arc<dyn PortalStore>;
