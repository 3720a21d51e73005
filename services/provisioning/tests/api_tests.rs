use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sip_provisioning::{
    build_quota_engine, create_router, ApiState, ProvisioningConfig, ProvisioningDatabase,
};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn test_router() -> (Router, TempDir) {
    let temp = tempdir().expect("failed to create temp dir");
    let config = ProvisioningConfig {
        data_dir: temp.path().join("data"),
        log_level: "warn".to_string(),
        ..ProvisioningConfig::default()
    };
    let database = Arc::new(
        ProvisioningDatabase::new(config.data_dir.clone()).expect("database should open"),
    );
    let engine = Arc::new(build_quota_engine(&config, Arc::clone(&database)));
    let state = Arc::new(ApiState::new(engine, database, config));
    (create_router(state), temp)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request should build");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    // Extractor rejections come back as plain text.
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_driver() {
    let (router, _temp) = test_router();
    let (status, body) = send(&router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["quota_driver"], "database");
}

#[tokio::test]
async fn quota_defaults_endpoint() {
    let (router, _temp) = test_router();
    let (status, body) =
        send(&router, Method::GET, "/v1/quotas/project-a/defaults", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "domains": 1, "subscribers": 10 }));
}

#[tokio::test]
async fn default_quota_class_update_changes_defaults() {
    let (router, _temp) = test_router();
    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/quota-classes/default",
        Some(json!({ "subscribers": 255 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "domains": 1, "subscribers": 255 }));
}

#[tokio::test]
async fn unknown_quota_resource_is_not_found() {
    let (router, _temp) = test_router();
    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/quotas/project-a",
        Some(json!({ "mailboxes": 5 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "quota_resource_unknown");
    assert_eq!(body["details"]["resources"], json!(["mailboxes"]));
}

#[tokio::test]
async fn domain_creation_is_limited_by_quota() {
    let (router, _temp) = test_router();

    let (status, created) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "example.org", "user_id": "user-a" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["name"], "example.org");
    assert_eq!(created["project_id"], "project-a");

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "example.net" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "over_quota");
    assert_eq!(body["details"]["resources"], json!(["domains"]));

    let (status, quotas) = send(
        &router,
        Method::PUT,
        "/v1/quotas/project-a",
        Some(json!({ "domains": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quotas["domains"], 2);

    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "example.net" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, listed) =
        send(&router, Method::GET, "/v1/projects/project-a/domains", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn subscriber_lifecycle() {
    let (router, _temp) = test_router();

    let (_, domain) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "example.org" })),
    )
    .await;
    let domain_id = domain["uuid"].as_str().expect("domain uuid").to_string();

    let (status, subscriber) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/subscribers",
        Some(json!({
            "username": "alice",
            "domain_id": domain_id,
            "email_address": "alice@example.org",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let uuid = subscriber["uuid"].as_str().expect("subscriber uuid").to_string();

    let (status, _) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/subscribers",
        Some(json!({ "username": "alice", "domain_id": domain_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = send(
        &router,
        Method::PUT,
        &format!("/v1/subscribers/{uuid}"),
        Some(json!({ "disabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["disabled"], true);
    assert_eq!(updated["email_address"], "alice@example.org");

    let (status, _) =
        send(&router, Method::DELETE, &format!("/v1/domains/{domain_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) =
        send(&router, Method::DELETE, &format!("/v1/subscribers/{uuid}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) =
        send(&router, Method::GET, &format!("/v1/subscribers/{uuid}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "subscriber_not_found");

    let (status, _) =
        send(&router, Method::DELETE, &format!("/v1/domains/{domain_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn subscriber_for_missing_domain_is_not_found() {
    let (router, _temp) = test_router();
    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/subscribers",
        Some(json!({ "username": "alice", "domain_id": "missing" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "domain_not_found");
}

#[tokio::test]
async fn empty_domain_name_is_rejected() {
    let (router, _temp) = test_router();
    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_name");
}

#[tokio::test]
async fn invalid_quota_update_writes_nothing() {
    let (router, _temp) = test_router();

    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/quotas/project-a",
        Some(json!({ "domains": 5, "subscribers": -2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_limit");

    let (status, quotas) = send(&router, Method::GET, "/v1/quotas/project-a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quotas, json!({ "domains": 1, "subscribers": 10 }));

    let (status, _) = send(
        &router,
        Method::PUT,
        "/v1/quota-classes/default",
        Some(json!({ "domains": 3, "subscribers": -5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, defaults) =
        send(&router, Method::GET, "/v1/quotas/project-a/defaults", None).await;
    assert_eq!(defaults, json!({ "domains": 1, "subscribers": 10 }));
}

#[tokio::test]
async fn domain_cannot_move_between_projects() {
    let (router, _temp) = test_router();

    send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "a.example.org" })),
    )
    .await;
    let (_, domain) = send(
        &router,
        Method::POST,
        "/v1/projects/project-b/domains",
        Some(json!({ "name": "b.example.org" })),
    )
    .await;
    let uuid = domain["uuid"].as_str().expect("domain uuid").to_string();

    let (status, _) = send(
        &router,
        Method::PUT,
        &format!("/v1/domains/{uuid}"),
        Some(json!({ "project_id": "project-a" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, listed) = send(&router, Method::GET, "/v1/projects/project-a/domains", None).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, updated) = send(
        &router,
        Method::PUT,
        &format!("/v1/domains/{uuid}"),
        Some(json!({ "disabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["disabled"], true);
    assert_eq!(updated["project_id"], "project-b");
}

#[tokio::test]
async fn subscriber_cannot_use_another_projects_domain() {
    let (router, _temp) = test_router();

    let (_, domain) = send(
        &router,
        Method::POST,
        "/v1/projects/project-a/domains",
        Some(json!({ "name": "example.org" })),
    )
    .await;
    let domain_id = domain["uuid"].as_str().expect("domain uuid").to_string();

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/projects/project-b/subscribers",
        Some(json!({ "username": "mallory", "domain_id": domain_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "domain_not_found");

    let (_, listed) =
        send(&router, Method::GET, "/v1/projects/project-b/subscribers", None).await;
    assert_eq!(listed, json!([]));
}
