//! Read views: entities with their immediate relations pre-joined.

use serde::Serialize;

use crate::comment::Comment;
use crate::evaluation::Evaluation;
use crate::metric::{Metric, MetricGroup};
use crate::product::Product;
use crate::project::InternalProject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricGroupWithMetrics {
    #[serde(flatten)]
    pub group: MetricGroup,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricWithGroups {
    #[serde(flatten)]
    pub metric: Metric,
    pub groups: Vec<MetricGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: Product,
    pub metric_groups: Vec<MetricGroupWithMetrics>,
    pub internal_projects: Vec<InternalProject>,
    pub evaluations: Vec<Evaluation>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationWithRefs {
    #[serde(flatten)]
    pub evaluation: Evaluation,
    pub product: Product,
    pub metric: Metric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithProducts {
    #[serde(flatten)]
    pub project: InternalProject,
    pub products: Vec<Product>,
}
