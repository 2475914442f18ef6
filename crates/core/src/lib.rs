//! `govportal-core`: the governance portal's data model and rules.
//!
//! This crate is **pure domain**: entity records, typed write requests, the
//! relation-set reconciler, the soft-delete policy, score domains and the
//! dashboard aggregation rules. Storage and HTTP live in other crates.

pub mod comment;
pub mod dashboard;
pub mod error;
pub mod evaluation;
pub mod id;
pub mod metric;
pub mod product;
pub mod project;
pub mod relation;
pub mod user;
pub mod view;

pub use comment::{Comment, NewComment};
pub use dashboard::{DashboardStats, RECENT_ACTIVITY_LIMIT, ScoreSummary};
pub use error::{DomainError, DomainResult};
pub use evaluation::{Evaluation, NewEvaluation, UpdateEvaluation};
pub use id::{CommentId, EvaluationId, InternalProjectId, MetricGroupId, MetricId, ProductId, UserId};
pub use metric::{
    CreateMetric, CreateMetricGroup, Metric, MetricGroup, MetricType, ScoreDomain, UpdateMetric,
    UpdateMetricGroup,
};
pub use product::{CreateProduct, Product, ProductFilter, ProductStatus, SoftDelete, UpdateProduct};
pub use project::{CreateProject, InternalProject, UpdateProject};
pub use relation::{RelationPlan, RelationWrite};
pub use user::{NewUser, User};
pub use view::{
    EvaluationWithRefs, MetricGroupWithMetrics, MetricWithGroups, ProductDetails, ProjectWithProducts,
};
