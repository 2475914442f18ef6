use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use govportal_core::MetricGroupId;

use crate::app::routes::deleted;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_metric_groups).post(create_metric_group))
        .route("/:id", put(update_metric_group).delete(delete_metric_group))
}

pub async fn list_metric_groups(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.store.list_metric_groups().await {
        Ok(groups) => (StatusCode::OK, Json(groups)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_metric_group(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateMetricGroupRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.create_metric_group(cmd).await {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_metric_group(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateMetricGroupRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: MetricGroupId = match errors::parse_id(&id) {
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

    match services.store.update_metric_group(id, cmd).await {
        Ok(group) => (StatusCode::OK, Json(group)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_metric_group(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: MetricGroupId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.store.delete_metric_group(id).await {
        Ok(()) => deleted(),
        Err(e) => errors::store_error_to_response(e),
    }
}
