//! HTTP tests for the gateway routes.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use tollgate_core::{
    parse_scopes, AccessConfig, ManualClock, PasswordPolicy, PoolConfig, RateLimitConfig,
    TokenConfig,
};
use tollgate_gateway::{create_router, AppState, GatewayConfig};

const API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

struct TestContext {
    server: TestServer,
    state: AppState,
}

fn test_config(items_limit: u32) -> GatewayConfig {
    let access = AccessConfig::new(TokenConfig::new("http-test-secret"))
        .with_password_policy(PasswordPolicy::default().with_cost(4))
        .with_pool(PoolConfig::new(2, 16))
        .with_rate_limit(
            RateLimitConfig::new(Duration::from_secs(60), 100)
                .with_class_limit("login", 5)
                .with_class_limit("register", 3)
                .with_class_limit("items", items_limit),
        )
        .with_default_scopes(parse_scopes("items:read"));
    GatewayConfig::new(access).with_admin("root", "root-pw")
}

async fn setup(items_limit: u32) -> TestContext {
    let clock = Arc::new(ManualClock::new(Duration::from_secs(1_800_000_000)));
    let state = AppState::with_clock(test_config(items_limit), clock).unwrap();
    state.bootstrap_admin().await.unwrap();
    let server = TestServer::new(create_router(state.clone())).unwrap();
    TestContext { server, state }
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

impl TestContext {
    async fn register(&self, username: &str, password: &str) -> Value {
        let response = self
            .server
            .post("/register")
            .json(&json!({ "username": username, "password": password }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Value>()
    }

    async fn token(&self, username: &str, password: &str, scope: &str) -> String {
        let response = self
            .server
            .post("/token")
            .form(&[("username", username), ("password", password), ("scope", scope)])
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<Value>();
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_and_hardening_headers() {
    let ctx = setup(10).await;

    let response = ctx.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["users"], 1);

    let headers = response.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert!(headers.contains_key(header::REFERRER_POLICY));
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn test_register_token_and_scoped_access() {
    let ctx = setup(10).await;

    let created = ctx.register("alice", "pw123").await;
    assert_eq!(created["username"], "alice");
    assert!(created["id"].is_string());

    let token = ctx.token("alice", "pw123", "items:read").await;

    let response = ctx
        .server
        .get("/protected")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["subject"], created["id"]);

    let response = ctx
        .server
        .post("/protected")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = ctx
        .server
        .get("/users/me")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let me = response.json::<Value>();
    assert_eq!(me["username"], "alice");
    assert_eq!(me["kind"], "user");
    assert_eq!(me["scopes"], json!(["items:read"]));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let ctx = setup(10).await;
    ctx.register("alice", "pw123").await;

    let response = ctx
        .server
        .post("/register")
        .json(&json!({ "username": "ALICE", "password": "other" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_missing_and_bad_credentials() {
    let ctx = setup(10).await;
    ctx.register("alice", "pw123").await;

    let response = ctx.server.get("/protected").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>(), json!({ "detail": "not authenticated" }));
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let response = ctx
        .server
        .post("/token")
        .form(&[("username", "alice"), ("password", "wrong")])
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>(), json!({ "detail": "invalid credentials" }));
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let response = ctx
        .server
        .get("/protected")
        .add_header(header::AUTHORIZATION, bearer("not.a.token"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["detail"], "could not validate credentials");
}

#[tokio::test]
async fn test_api_key_provision_use_and_revoke() {
    let ctx = setup(10).await;
    let alice = ctx.register("alice", "pw123").await;
    let alice_id = alice["id"].as_str().unwrap();

    // Grant the key management scope through the admin API.
    let admin_token = ctx.token("root", "root-pw", "admin").await;
    let response = ctx
        .server
        .post(&format!("/admin/users/{}/grants", alice_id))
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .json(&json!({ "scopes": ["keys:manage"] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let token = ctx.token("alice", "pw123", "items:read keys:manage").await;
    let response = ctx
        .server
        .post("/api-keys")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({ "scopes": ["items:read", "items:write"] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created = response.json::<Value>();
    assert_eq!(created["scopes"], json!(["items:read"]));
    let raw_key = created["api_key"].as_str().unwrap().to_string();
    let key_id = created["id"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .get("/protected")
        .add_header(API_KEY, HeaderValue::from_str(&raw_key).unwrap())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = ctx
        .server
        .delete(&format!("/api-keys/{}", key_id))
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = ctx
        .server
        .get("/protected")
        .add_header(API_KEY, HeaderValue::from_str(&raw_key).unwrap())
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let ctx = setup(2).await;
    ctx.register("alice", "pw123").await;
    let token = ctx.token("alice", "pw123", "items:read").await;

    for _ in 0..2 {
        let response = ctx
            .server
            .get("/protected")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let response = ctx
        .server
        .get("/protected")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let ctx = setup(10).await;
    let alice = ctx.register("alice", "pw123").await;
    let alice_id = alice["id"].as_str().unwrap();

    let user_token = ctx.token("alice", "pw123", "admin items:read").await;
    let response = ctx
        .server
        .get("/admin/users")
        .add_header(header::AUTHORIZATION, bearer(&user_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let admin_token = ctx.token("root", "root-pw", "admin").await;
    let response = ctx
        .server
        .get("/admin/users")
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>().as_array().unwrap().len(), 2);

    let response = ctx
        .server
        .post(&format!("/admin/users/{}/disable", alice_id))
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["disabled"], true);

    let response = ctx
        .server
        .post("/token")
        .form(&[("username", "alice"), ("password", "pw123")])
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = ctx
        .server
        .post("/admin/users/missing/enable")
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = setup(10).await;
    ctx.server.get("/protected").await;

    let response = ctx.server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(text.contains("tollgate_requests_denied_total 1"));
    assert!(text.contains("tollgate_failures_total{kind=\"not_authenticated\"} 1"));
    assert_eq!(ctx.state.gateway.metrics().requests_denied(), 1);
}

#[tokio::test]
async fn test_registration_limited_per_client() {
    let ctx = setup(10).await;
    let client = HeaderValue::from_static("203.0.113.7, 10.0.0.1");

    for i in 0..3 {
        let response = ctx
            .server
            .post("/register")
            .add_header(FORWARDED_FOR, client.clone())
            .json(&json!({ "username": format!("user{}", i), "password": "pw" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }

    let response = ctx
        .server
        .post("/register")
        .add_header(FORWARDED_FOR, client.clone())
        .json(&json!({ "username": "user3", "password": "pw" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    assert!(ctx.state.gateway.store().find_by_username("user3").is_none());

    let response = ctx
        .server
        .post("/register")
        .add_header(FORWARDED_FOR, HeaderValue::from_static("198.51.100.2"))
        .json(&json!({ "username": "user3", "password": "pw" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_token_limited_per_client_across_usernames() {
    let ctx = setup(10).await;
    let client = HeaderValue::from_static("203.0.113.9");

    for i in 0..5 {
        let response = ctx
            .server
            .post("/token")
            .add_header(FORWARDED_FOR, client.clone())
            .form(&[("username", format!("ghost{}", i)), ("password", "pw".to_string())])
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    let response = ctx
        .server
        .post("/token")
        .add_header(FORWARDED_FOR, client)
        .form(&[("username", "root"), ("password", "root-pw")])
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);

    // Other clients are unaffected.
    ctx.token("root", "root-pw", "admin").await;
}

#[tokio::test]
async fn test_admin_stats() {
    let ctx = setup(10).await;
    let alice = ctx.register("alice", "pw123").await;
    let alice_id = alice["id"].as_str().unwrap();
    let admin_token = ctx.token("root", "root-pw", "admin").await;

    ctx.server
        .post(&format!("/admin/users/{}/disable", alice_id))
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .await;

    let response = ctx
        .server
        .get("/admin/stats")
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let stats = response.json::<Value>();
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["disabled_users"], 1);
    assert_eq!(
        stats["roles_count"],
        json!({ "admin": 1, "user": 2, "viewer": 0 })
    );
    assert_eq!(stats["requested_by"], "root");

    let user_token = ctx.token("root", "root-pw", "items:read").await;
    let response = ctx
        .server
        .get("/admin/stats")
        .add_header(header::AUTHORIZATION, bearer(&user_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}
