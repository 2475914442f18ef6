//! Dashboard aggregation rules.
//!
//! The snapshot is recomputed on every request from current store state; there
//! is no cached or incrementally maintained copy.

use serde::Serialize;

use crate::view::EvaluationWithRefs;

/// Number of evaluations shown as recent activity.
pub const RECENT_ACTIVITY_LIMIT: usize = 5;

/// Count and sum of all evaluation scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreSummary {
    pub count: u64,
    pub sum: i64,
}

impl ScoreSummary {
    pub fn from_scores(scores: impl IntoIterator<Item = i32>) -> Self {
        scores.into_iter().fold(Self::default(), |acc, score| Self {
            count: acc.count + 1,
            sum: acc.sum + i64::from(score),
        })
    }

    /// Mean score with one decimal, halves rounded away from zero; `"0.0"` when
    /// there are no scores.
    ///
    /// Integer arithmetic keeps ties exact (`0.25` renders as `"0.3"`).
    pub fn average_display(&self) -> String {
        if self.count == 0 {
            return "0.0".to_string();
        }
        let count = i128::from(self.count);
        let scaled = i128::from(self.sum) * 10;
        let tenths = (2 * scaled.abs() + count) / (2 * count);
        let sign = if scaled < 0 { "-" } else { "" };
        format!("{sign}{}.{}", tenths / 10, tenths % 10)
    }
}

/// Dashboard snapshot served by `GET /dashboard/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_products: u64,
    pub active_evaluations: u64,
    pub internal_projects: u64,
    pub avg_metric_score: String,
    pub recent_activity: Vec<EvaluationWithRefs>,
}

/// Newest evaluations first (ties by descending id), truncated to `limit`.
pub fn recent_activity(mut evaluations: Vec<EvaluationWithRefs>, limit: usize) -> Vec<EvaluationWithRefs> {
    evaluations.sort_by(|a, b| {
        b.evaluation
            .created_at
            .cmp(&a.evaluation.created_at)
            .then_with(|| b.evaluation.id.cmp(&a.evaluation.id))
    });
    evaluations.truncate(limit);
    evaluations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use crate::evaluation::{Evaluation, NewEvaluation};
    use crate::id::{EvaluationId, MetricId, ProductId};
    use crate::metric::{CreateMetric, Metric};
    use crate::product::{CreateProduct, Product};

    fn row(id: i64, minutes: i64) -> EvaluationWithRefs {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let product = Product::from_create(
            ProductId::new(1),
            &CreateProduct {
                name: "Kafka".to_string(),
                ..Default::default()
            },
        );
        let metric = Metric::from_create(
            MetricId::new(1),
            &CreateMetric {
                name: "Security".to_string(),
                ..Default::default()
            },
        );
        let evaluation = Evaluation::from_new(
            EvaluationId::new(id),
            &NewEvaluation {
                product_id: product.id,
                metric_id: metric.id,
                score: 5,
                comments: None,
                stakeholders: vec![],
            },
            base + Duration::minutes(minutes),
        );
        EvaluationWithRefs {
            evaluation,
            product,
            metric,
        }
    }

    #[test]
    fn empty_average_is_zero_point_zero() {
        assert_eq!(ScoreSummary::default().average_display(), "0.0");
    }

    #[test]
    fn average_uses_one_decimal() {
        assert_eq!(ScoreSummary::from_scores([8, 7, 7]).average_display(), "7.3");
        assert_eq!(ScoreSummary::from_scores([10]).average_display(), "10.0");
        assert_eq!(ScoreSummary::from_scores([0, 1, 1]).average_display(), "0.7");
    }

    #[test]
    fn average_rounds_exact_halves_up() {
        assert_eq!(ScoreSummary::from_scores([0, 0, 0, 1]).average_display(), "0.3");
        assert_eq!(ScoreSummary::from_scores([1, 2]).average_display(), "1.5");
        assert_eq!(ScoreSummary::from_scores([-1, 0, 0, 0]).average_display(), "-0.3");
    }

    #[test]
    fn recent_activity_is_newest_first_and_capped() {
        let rows = (1..=8).map(|i| row(i, i * 3 % 7)).collect::<Vec<_>>();
        let recent = recent_activity(rows, RECENT_ACTIVITY_LIMIT);
        assert_eq!(recent.len(), 5);
        for pair in recent.windows(2) {
            assert!(pair[0].evaluation.created_at >= pair[1].evaluation.created_at);
        }
    }

    #[test]
    fn timestamp_ties_prefer_higher_ids() {
        let recent = recent_activity(vec![row(1, 0), row(3, 0), row(2, 0)], 5);
        let ids = recent.iter().map(|r| r.evaluation.id.get()).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    proptest! {
        #[test]
        fn average_display_is_within_rounding_of_the_mean(scores in proptest::collection::vec(-100i32..=100, 1..60)) {
            let summary = ScoreSummary::from_scores(scores.iter().copied());
            let mean = scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64;
            let shown: f64 = summary.average_display().parse().unwrap();
            prop_assert!((shown - mean).abs() <= 0.05 + 1e-9);
        }

        #[test]
        fn recent_activity_length_is_min_of_five_and_total(n in 0usize..12) {
            let rows = (0..n as i64).map(|i| row(i + 1, i)).collect::<Vec<_>>();
            prop_assert_eq!(recent_activity(rows, RECENT_ACTIVITY_LIMIT).len(), n.min(5));
        }
    }
}
