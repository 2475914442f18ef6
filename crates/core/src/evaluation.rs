use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EvaluationId, MetricId, ProductId};

/// One scored assessment of a product against a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: EvaluationId,
    pub product_id: ProductId,
    pub metric_id: MetricId,
    pub score: i32,
    pub comments: Option<String>,
    pub stakeholders: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn from_new(id: EvaluationId, input: &NewEvaluation, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id: input.product_id,
            metric_id: input.metric_id,
            score: input.score,
            comments: input.comments.clone(),
            stakeholders: input.stakeholders.clone(),
            created_at,
        }
    }

    /// `created_at` is immutable and never touched here.
    pub fn apply_update(&mut self, update: &UpdateEvaluation) {
        if let Some(product_id) = update.product_id {
            self.product_id = product_id;
        }
        if let Some(metric_id) = update.metric_id {
            self.metric_id = metric_id;
        }
        if let Some(score) = update.score {
            self.score = score;
        }
        if let Some(comments) = &update.comments {
            self.comments = comments.clone();
        }
        if let Some(stakeholders) = &update.stakeholders {
            self.stakeholders = stakeholders.clone();
        }
    }
}

/// One element of a single or batch evaluation create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvaluation {
    pub product_id: ProductId,
    pub metric_id: MetricId,
    pub score: i32,
    pub comments: Option<String>,
    pub stakeholders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateEvaluation {
    pub product_id: Option<ProductId>,
    pub metric_id: Option<MetricId>,
    pub score: Option<i32>,
    pub comments: Option<Option<String>>,
    pub stakeholders: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_creation_time() {
        let created_at = Utc::now();
        let mut e = Evaluation::from_new(
            EvaluationId::new(1),
            &NewEvaluation {
                product_id: ProductId::new(1),
                metric_id: MetricId::new(2),
                score: 3,
                comments: None,
                stakeholders: vec!["platform".to_string()],
            },
            created_at,
        );
        e.apply_update(&UpdateEvaluation {
            score: Some(9),
            comments: Some(Some("re-reviewed".to_string())),
            ..Default::default()
        });
        assert_eq!(e.score, 9);
        assert_eq!(e.comments.as_deref(), Some("re-reviewed"));
        assert_eq!(e.stakeholders, vec!["platform".to_string()]);
        assert_eq!(e.created_at, created_at);
    }
}
