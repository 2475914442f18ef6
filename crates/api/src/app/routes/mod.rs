use axum::{routing::get, Router};

pub mod comments;
pub mod dashboard;
pub mod evaluations;
pub mod metric_groups;
pub mod metrics;
pub mod products;
pub mod projects;
pub mod system;
pub mod users;

/// Router for every `/api` endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/dashboard/stats", get(dashboard::stats))
        .nest("/products", products::router())
        .nest("/metrics", metrics::router())
        .nest("/metric-groups", metric_groups::router())
        .nest("/evaluations", evaluations::router())
        .nest("/projects", projects::router())
        .nest("/comments", comments::router())
        .nest("/users", users::router())
}

/// Body returned by hard deletes.
pub(crate) fn deleted() -> axum::response::Response {
    use axum::response::IntoResponse;

    (
        axum::http::StatusCode::OK,
        axum::Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}
