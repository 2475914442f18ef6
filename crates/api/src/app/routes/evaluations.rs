use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use govportal_core::{EvaluationId, MetricId, NewEvaluation, UpdateEvaluation};

use crate::app::routes::deleted;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_evaluations).post(create_evaluation))
        .route("/batch", post(create_batch))
        .route("/:id", put(update_evaluation).delete(delete_evaluation))
}

/// Scores keyed by metric, so each metric is looked up once per request.
fn scores_by_metric(scored: impl IntoIterator<Item = (MetricId, i32)>) -> BTreeMap<MetricId, Vec<i32>> {
    let mut by_metric = BTreeMap::<MetricId, Vec<i32>>::new();
    for (metric_id, score) in scored {
        by_metric.entry(metric_id).or_default().push(score);
    }
    by_metric
}

/// Scores outside the metric's domain are kept, but logged.
async fn warn_if_out_of_domain(services: &AppServices, scored: impl IntoIterator<Item = (MetricId, i32)>) {
    for (metric_id, scores) in scores_by_metric(scored) {
        let metric = match services.store.get_metric(metric_id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%metric_id, error = %e, "score domain check skipped");
                continue;
            }
        };
        let domain = metric.score_domain();
        let outside = scores.into_iter().filter(|s| !domain.contains(*s)).collect::<Vec<_>>();
        if !outside.is_empty() {
            tracing::warn!(%metric_id, scores = ?outside, %domain, "score outside metric domain");
        }
    }
}

pub async fn list_evaluations(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.store.list_evaluations().await {
        Ok(evaluations) => (StatusCode::OK, Json(evaluations)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_evaluation(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateEvaluationRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };
    let input = NewEvaluation::from(body);

    match services.store.create_evaluation(input, Utc::now()).await {
        Ok(evaluation) => {
            warn_if_out_of_domain(&services, [(evaluation.metric_id, evaluation.score)]).await;
            (StatusCode::CREATED, Json(evaluation)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// All-or-nothing bulk insert; responds with the number of rows created.
pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Vec<dto::CreateEvaluationRequest>>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };
    let inputs = body.into_iter().map(NewEvaluation::from).collect::<Vec<_>>();
    let scored = inputs.iter().map(|e| (e.metric_id, e.score)).collect::<Vec<_>>();

    match services.store.create_evaluations(inputs, Utc::now()).await {
        Ok(count) => {
            warn_if_out_of_domain(&services, scored).await;
            tracing::info!(count, "evaluation batch created");
            (StatusCode::CREATED, Json(json!({ "count": count }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_evaluation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateEvaluationRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: EvaluationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    match services.store.update_evaluation(id, UpdateEvaluation::from(body)).await {
        Ok(evaluation) => {
            warn_if_out_of_domain(&services, [(evaluation.metric_id, evaluation.score)]).await;
            (StatusCode::OK, Json(evaluation)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_evaluation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EvaluationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.store.delete_evaluation(id).await {
        Ok(()) => deleted(),
        Err(e) => errors::store_error_to_response(e),
    }
}
