//! Metrics, metric groups and score domains.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult, require_non_blank};
use crate::id::{MetricGroupId, MetricId};

pub const DEFAULT_MIN_SCORE: i32 = 1;
pub const DEFAULT_MAX_SCORE: i32 = 10;

/// Scoring scheme of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    /// Bounded score in `[min_score, max_score]`.
    #[default]
    Number,
    /// 0 = "No", 1 = "Yes".
    Boolean,
    /// Any integer.
    CustomNumber,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
            Self::CustomNumber => "CUSTOM_NUMBER",
        }
    }
}

impl core::str::FromStr for MetricType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NUMBER" => Ok(Self::Number),
            "BOOLEAN" => Ok(Self::Boolean),
            "CUSTOM_NUMBER" => Ok(Self::CustomNumber),
            other => Err(DomainError::validation(format!("unknown metric type: {other}"))),
        }
    }
}

/// Set of scores a metric describes as meaningful.
///
/// Descriptive only: evaluations outside the domain are still stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDomain {
    Binary,
    Unbounded,
    Range { min: i32, max: i32 },
}

impl ScoreDomain {
    pub fn contains(&self, score: i32) -> bool {
        match *self {
            Self::Binary => score == 0 || score == 1,
            Self::Unbounded => true,
            Self::Range { min, max } => (min..=max).contains(&score),
        }
    }
}

impl core::fmt::Display for ScoreDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Binary => f.write_str("{0, 1}"),
            Self::Unbounded => f.write_str("any integer"),
            Self::Range { min, max } => write!(f, "[{min}, {max}]"),
        }
    }
}

/// A named evaluation criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: MetricId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub min_score: i32,
    pub max_score: i32,
}

impl Metric {
    pub fn from_create(id: MetricId, input: &CreateMetric) -> Self {
        Self {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            metric_type: input.metric_type,
            min_score: input.min_score,
            max_score: input.max_score,
        }
    }

    pub fn apply_update(&mut self, update: &UpdateMetric) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(metric_type) = update.metric_type {
            self.metric_type = metric_type;
        }
        if let Some(min) = update.min_score {
            self.min_score = min;
        }
        if let Some(max) = update.max_score {
            self.max_score = max;
        }
    }

    /// Copy of `self` with `update` applied, rejected if the merged bounds invert.
    pub fn merged(&self, update: &UpdateMetric) -> DomainResult<Metric> {
        let mut next = self.clone();
        next.apply_update(update);
        check_bounds(next.metric_type, next.min_score, next.max_score)?;
        Ok(next)
    }

    pub fn score_domain(&self) -> ScoreDomain {
        match self.metric_type {
            MetricType::Boolean => ScoreDomain::Binary,
            MetricType::CustomNumber => ScoreDomain::Unbounded,
            MetricType::Number => ScoreDomain::Range {
                min: self.min_score,
                max: self.max_score,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMetric {
    pub name: String,
    pub description: Option<String>,
    pub metric_type: MetricType,
    pub min_score: i32,
    pub max_score: i32,
    pub group_ids: Option<BTreeSet<MetricGroupId>>,
}

impl Default for CreateMetric {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            metric_type: MetricType::Number,
            min_score: DEFAULT_MIN_SCORE,
            max_score: DEFAULT_MAX_SCORE,
            group_ids: None,
        }
    }
}

impl CreateMetric {
    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("name", &self.name)?;
        check_bounds(self.metric_type, self.min_score, self.max_score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateMetric {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub metric_type: Option<MetricType>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub group_ids: Option<BTreeSet<MetricGroupId>>,
}

impl UpdateMetric {
    pub fn validate(&self) -> DomainResult<()> {
        match &self.name {
            Some(name) => require_non_blank("name", name),
            None => Ok(()),
        }
    }
}

fn check_bounds(metric_type: MetricType, min: i32, max: i32) -> DomainResult<()> {
    if metric_type == MetricType::Number && min > max {
        return Err(DomainError::validation(format!(
            "minScore ({min}) must not exceed maxScore ({max})"
        )));
    }
    Ok(())
}

/// A reusable bundle of metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricGroup {
    pub id: MetricGroupId,
    pub name: String,
    pub description: Option<String>,
}

impl MetricGroup {
    pub fn from_create(id: MetricGroupId, input: &CreateMetricGroup) -> Self {
        Self {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
        }
    }

    pub fn apply_update(&mut self, update: &UpdateMetricGroup) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateMetricGroup {
    pub name: String,
    pub description: Option<String>,
    pub metric_ids: Option<BTreeSet<MetricId>>,
}

impl CreateMetricGroup {
    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateMetricGroup {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub metric_ids: Option<BTreeSet<MetricId>>,
}

impl UpdateMetricGroup {
    pub fn validate(&self) -> DomainResult<()> {
        match &self.name {
            Some(name) => require_non_blank("name", name),
            None => Ok(()),
        }
    }
}
