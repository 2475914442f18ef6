use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use govportal_api::app::{build_app, AppServices};
use govportal_api::middleware::cors_layer;
use govportal_infra::AllowedOrigins;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_origins(AllowedOrigins::Any).await
    }

    async fn spawn_with_origins(origins: AllowedOrigins) -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let cors = cors_layer(&origins).unwrap();
        let app = build_app(Arc::new(AppServices::in_memory()), cors);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.put(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.delete(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn create(&self, path: &str, body: Value) -> i64 {
        let (status, created) = self.post(path, body).await;
        assert_eq!(status, StatusCode::CREATED, "POST {path} failed: {created}");
        created["id"].as_i64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_dashboard_reports_zero_average() {
    let srv = TestServer::spawn().await;
    let (status, stats) = srv.get("/api/dashboard/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalProducts"], 0);
    assert_eq!(stats["activeEvaluations"], 0);
    assert_eq!(stats["internalProjects"], 0);
    assert_eq!(stats["avgMetricScore"], "0.0");
    assert_eq!(stats["recentActivity"], json!([]));
}

#[tokio::test]
async fn product_update_without_group_ids_keeps_groups_and_empty_list_clears_them() {
    let srv = TestServer::spawn().await;
    let group = srv.create("/api/metric-groups", json!({ "name": "Ops" })).await;
    let product = srv
        .create("/api/products", json!({ "name": "Kafka", "metricGroupIds": [group] }))
        .await;

    let (status, _) = srv.put(&format!("/api/products/{product}"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, details) = srv.get(&format!("/api/products/{product}")).await;
    assert_eq!(details["metricGroups"].as_array().unwrap().len(), 1);
    assert_eq!(details["metricGroups"][0]["id"], group);

    let (status, _) = srv
        .put(&format!("/api/products/{product}"), json!({ "metricGroupIds": [] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, details) = srv.get(&format!("/api/products/{product}")).await;
    assert_eq!(details["metricGroups"], json!([]));
}

#[tokio::test]
async fn unknown_group_id_rejects_the_whole_create() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv
        .post("/api/products", json!({ "name": "Kafka", "metricGroupIds": [999] }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "constraint_violation");
    assert!(body["error"].as_str().unwrap().contains("999"));

    let (_, products) = srv.get("/api/products?includeDeleted=true").await;
    assert_eq!(products, json!([]));
}

#[tokio::test]
async fn evaluation_is_listed_with_product_and_metric() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "Kafka" })).await;
    let metric = srv
        .create(
            "/api/metrics",
            json!({ "name": "Security", "type": "NUMBER", "minScore": 1, "maxScore": 10 }),
        )
        .await;

    srv.create(
        "/api/evaluations",
        json!({
            "productId": product,
            "metricId": metric,
            "score": 8,
            "comments": "solid",
            "stakeholders": ["platform"]
        }),
    )
    .await;

    let (status, evaluations) = srv.get("/api/evaluations").await;
    assert_eq!(status, StatusCode::OK);
    let first = &evaluations[0];
    assert_eq!(first["score"], 8);
    assert_eq!(first["product"]["name"], "Kafka");
    assert_eq!(first["metric"]["name"], "Security");
    assert_eq!(first["stakeholders"], json!(["platform"]));
}

#[tokio::test]
async fn deleting_a_product_twice_is_a_soft_no_op() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "ActiveMQ" })).await;

    let (status, first) = srv.delete(&format!("/api/products/{product}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["product"]["isDeleted"], true);
    assert!(first["product"]["deletedAt"].is_string());

    let (status, second) = srv.delete(&format!("/api/products/{product}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], true);
    assert!(second["message"].as_str().unwrap().contains("already soft-deleted"));

    let (_, details) = srv.get(&format!("/api/products/{product}")).await;
    assert_eq!(details["deletedAt"], first["product"]["deletedAt"]);

    let (_, active) = srv.get("/api/products").await;
    assert_eq!(active, json!([]));
    let (_, all) = srv.get("/api/products?includeDeleted=true").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_an_unknown_product_is_not_found() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.delete("/api/products/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn non_numeric_ids_are_rejected() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.put("/api/metrics/abc", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_id");
}

#[tokio::test]
async fn batch_of_three_creates_exactly_three() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "Kafka" })).await;
    let metric = srv.create("/api/metrics", json!({ "name": "Security" })).await;

    let batch = (0..3)
        .map(|i| json!({ "productId": product, "metricId": metric, "score": 5 + i }))
        .collect::<Vec<_>>();
    let (status, body) = srv.post("/api/evaluations/batch", Value::Array(batch)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["count"], 3);

    let (_, evaluations) = srv.get("/api/evaluations").await;
    assert_eq!(evaluations.as_array().unwrap().len(), 3);

    let (_, stats) = srv.get("/api/dashboard/stats").await;
    assert_eq!(stats["activeEvaluations"], 3);
    assert_eq!(stats["avgMetricScore"], "6.0");
    assert_eq!(stats["recentActivity"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn batch_with_an_unknown_metric_creates_nothing() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "Kafka" })).await;
    let metric = srv.create("/api/metrics", json!({ "name": "Security" })).await;

    let (status, _) = srv
        .post(
            "/api/evaluations/batch",
            json!([
                { "productId": product, "metricId": metric, "score": 5 },
                { "productId": product, "metricId": 777, "score": 5 }
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, evaluations) = srv.get("/api/evaluations").await;
    assert_eq!(evaluations, json!([]));
}

#[tokio::test]
async fn metric_with_evaluations_cannot_be_deleted() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "Kafka" })).await;
    let metric = srv.create("/api/metrics", json!({ "name": "Security" })).await;
    let evaluation = srv
        .create(
            "/api/evaluations",
            json!({ "productId": product, "metricId": metric, "score": 4 }),
        )
        .await;

    let (status, _) = srv.delete(&format!("/api/metrics/{metric}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = srv.delete(&format!("/api/evaluations/{evaluation}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = srv.delete(&format!("/api/metrics/{metric}")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metric_groups_and_metrics_see_the_same_membership() {
    let srv = TestServer::spawn().await;
    let metric = srv.create("/api/metrics", json!({ "name": "Security" })).await;
    let group = srv
        .create("/api/metric-groups", json!({ "name": "Risk", "metricIds": [metric] }))
        .await;

    let (_, metrics) = srv.get("/api/metrics").await;
    assert_eq!(metrics[0]["groups"][0]["id"], group);

    let (_, groups) = srv.get("/api/metric-groups").await;
    assert_eq!(groups[0]["metrics"][0]["id"], metric);

    let (status, _) = srv.delete(&format!("/api/metric-groups/{group}")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, metrics) = srv.get("/api/metrics").await;
    assert_eq!(metrics[0]["groups"], json!([]));
}

#[tokio::test]
async fn projects_link_products() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "Kafka" })).await;
    let project = srv
        .create("/api/projects", json!({ "name": "Billing", "productIds": [product] }))
        .await;

    let (_, projects) = srv.get("/api/projects").await;
    assert_eq!(projects[0]["products"][0]["name"], "Kafka");

    let (_, details) = srv.get(&format!("/api/products/{product}")).await;
    assert_eq!(details["internalProjects"][0]["id"], project);

    let (_, stats) = srv.get("/api/dashboard/stats").await;
    assert_eq!(stats["internalProjects"], 1);
    assert_eq!(stats["totalProducts"], 1);
}

#[tokio::test]
async fn comments_attach_to_products() {
    let srv = TestServer::spawn().await;
    let product = srv.create("/api/products", json!({ "name": "Kafka" })).await;
    let comment = srv
        .create("/api/comments", json!({ "productId": product, "content": "needs review" }))
        .await;

    let (_, details) = srv.get(&format!("/api/products/{product}")).await;
    assert_eq!(details["comments"][0]["content"], "needs review");

    let (status, _) = srv.delete(&format!("/api/comments/{comment}")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, details) = srv.get(&format!("/api/products/{product}")).await;
    assert_eq!(details["comments"], json!([]));
}

#[tokio::test]
async fn users_require_unique_email() {
    let srv = TestServer::spawn().await;
    srv.create("/api/users", json!({ "email": "ada@example.com", "name": "Ada" }))
        .await;

    let (status, _) = srv.post("/api/users", json!({ "email": "ada@example.com" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = srv.post("/api/users", json!({ "email": "not-an-email" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (_, users) = srv.get("/api/users").await;
    assert_eq!(users.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.post("/api/products", json!({ "name": "Kafka", "status": "RETIRED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = srv.post("/api/products", json!({ "name": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn browser_preflight_is_answered_for_allowed_origins() {
    let srv = TestServer::spawn_with_origins(AllowedOrigins::List(vec![
        "http://localhost:5173".to_string(),
    ]))
    .await;

    let res = srv
        .client
        .request(reqwest::Method::OPTIONS, srv.url("/api/metrics"))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success(), "preflight status {}", res.status());
    assert_eq!(
        res.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
    let methods = res.headers()["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST"), "allowed methods: {methods}");

    let res = srv
        .client
        .get(srv.url("/api/metrics"))
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );

    let res = srv
        .client
        .get(srv.url("/api/metrics"))
        .header("Origin", "http://evil.example")
        .send()
        .await
        .unwrap();
    assert!(res.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn any_origin_is_allowed_by_default() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .get(srv.url("/api/products"))
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn metric_update_cannot_invert_bounds() {
    let srv = TestServer::spawn().await;
    let group = srv.create("/api/metric-groups", json!({ "name": "Perf" })).await;
    let metric = srv
        .create("/api/metrics", json!({ "name": "Latency", "groupIds": [group] }))
        .await;

    let (status, body) = srv
        .put(&format!("/api/metrics/{metric}"), json!({ "minScore": 20, "groupIds": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (_, metrics) = srv.get("/api/metrics").await;
    assert_eq!(metrics[0]["minScore"], 1);
    assert_eq!(metrics[0]["maxScore"], 10);
    assert_eq!(metrics[0]["groups"].as_array().unwrap().len(), 1);

    let (status, updated) = srv
        .put(&format!("/api/metrics/{metric}"), json!({ "minScore": 20, "maxScore": 30 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["minScore"], 20);
}

#[tokio::test]
async fn null_description_clears_and_absent_description_keeps() {
    let srv = TestServer::spawn().await;
    let product = srv
        .create("/api/products", json!({ "name": "Kafka", "description": "Event log" }))
        .await;
    let path = format!("/api/products/{product}");

    let (status, kept) = srv.put(&path, json!({ "status": "APPROVED" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kept["description"], "Event log");

    let (status, cleared) = srv.put(&path, json!({ "description": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["description"], Value::Null);

    let (_, details) = srv.get(&path).await;
    assert_eq!(details["description"], Value::Null);
    assert_eq!(details["status"], "APPROVED");
}
