//! Dashboard snapshot query.

use govportal_core::{DashboardStats, ProductFilter, RECENT_ACTIVITY_LIMIT};

use crate::error::StoreResult;
use crate::store::PortalStore;

/// Compute the dashboard from current store state.
///
/// `totalProducts` counts active products only, matching the default product listing.
pub async fn dashboard_stats<S>(store: &S) -> StoreResult<DashboardStats>
where
    S: PortalStore + ?Sized,
{
    let total_products = store.count_products(ProductFilter::default()).await?;
    let active_evaluations = store.count_evaluations().await?;
    let internal_projects = store.count_projects().await?;
    let avg_metric_score = store.score_summary().await?.average_display();
    let recent_activity = store.recent_evaluations(RECENT_ACTIVITY_LIMIT).await?;

    tracing::debug!(total_products, active_evaluations, internal_projects, "dashboard computed");

    Ok(DashboardStats {
        total_products,
        active_evaluations,
        internal_projects,
        avg_metric_score,
        recent_activity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use govportal_core::{CreateMetric, CreateProduct, CreateProject, NewEvaluation};

    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn empty_store_reports_zeroes() {
        let store = InMemoryStore::new();
        let stats = dashboard_stats(&store).await.unwrap();

        assert_eq!(stats.total_products, 0);
        assert_eq!(stats.active_evaluations, 0);
        assert_eq!(stats.internal_projects, 0);
        assert_eq!(stats.avg_metric_score, "0.0");
        assert!(stats.recent_activity.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_store_state() {
        let store = InMemoryStore::new();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        let kafka = store
            .create_product(CreateProduct {
                name: "Kafka".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let retired = store
            .create_product(CreateProduct {
                name: "ActiveMQ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.soft_delete_product(retired.id, base).await.unwrap();
        store
            .create_project(CreateProject {
                name: "Billing".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let security = store
            .create_metric(CreateMetric {
                name: "Security".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        for (i, score) in [8, 7, 7, 9, 4, 6].into_iter().enumerate() {
            store
                .create_evaluation(
                    NewEvaluation {
                        product_id: kafka.id,
                        metric_id: security.id,
                        score,
                        comments: None,
                        stakeholders: vec![],
                    },
                    base + Duration::minutes(i as i64),
                )
                .await
                .unwrap();
        }

        let stats = dashboard_stats(&store).await.unwrap();
        assert_eq!(stats.total_products, 1);
        assert_eq!(stats.active_evaluations, 6);
        assert_eq!(stats.internal_projects, 1);
        assert_eq!(stats.avg_metric_score, "6.8");
        assert_eq!(stats.recent_activity.len(), RECENT_ACTIVITY_LIMIT);
        assert_eq!(stats.recent_activity[0].evaluation.score, 6);
        assert_eq!(stats.recent_activity[0].product.name, "Kafka");
    }
}
