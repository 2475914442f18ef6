use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use govportal_core::MetricId;

use crate::app::routes::deleted;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_metrics).post(create_metric))
        .route("/:id", put(update_metric).delete(delete_metric))
}

pub async fn list_metrics(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.store.list_metrics().await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_metric(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateMetricRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.create_metric(cmd).await {
        Ok(metric) => (StatusCode::CREATED, Json(metric)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_metric(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateMetricRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: MetricId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.update_metric(id, cmd).await {
        Ok(metric) => (StatusCode::OK, Json(metric)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_metric(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: MetricId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.store.delete_metric(id).await {
        Ok(()) => deleted(),
        Err(e) => errors::store_error_to_response(e),
    }
}
