//! Router-level tests for the admin API and the API-key middleware.

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use axum_test::TestServer;
use serde_json::{json, Value};

use keygate_auth::X_REAL_IP;
use keygate_gateway::{
    create_router, protect_with_api_key, ApiCaller, GatewayConfig, GatewayState,
};
use keygate_store::MemoryStore;

const PASSWORD: &str = "correct horse";

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.admin_password = PASSWORD.to_string();
    config.network.proxy_url = Some("http://global-proxy:3128".to_string());
    config.network.edge_clearance = Some("global-clearance".to_string());
    config
}

fn setup() -> (TestServer, GatewayState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = GatewayState::from_store(store.clone(), config());
    let server = TestServer::new(create_router(state.clone())).unwrap();
    (server, state, store)
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

async fn login(server: &TestServer) -> HeaderValue {
    let response = server
        .post("/login")
        .json(&json!({"username": "admin", "password": PASSWORD}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    bearer(body["token"].as_str().unwrap())
}

#[tokio::test]
async fn health_is_public() {
    let (server, _, _) = setup();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn admin_routes_require_session() {
    let (server, _, _) = setup();

    let response = server.get("/api-keys").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "unauthorized");

    let response = server
        .get("/api-keys")
        .add_header(AUTHORIZATION, bearer("not-a-session"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/login")
        .json(&json!({"username": "admin", "password": "wrong"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_ends_session() {
    let (server, _, _) = setup();
    let session = login(&server).await;

    server
        .post("/logout")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .assert_status_ok();

    server
        .get("/api-keys")
        .add_header(AUTHORIZATION, session)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_disabled_without_password() {
    let store = Arc::new(MemoryStore::new());
    let state = GatewayState::from_store(store, GatewayConfig::default());
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/login")
        .json(&json!({"username": "admin", "password": ""}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn api_key_lifecycle() {
    let (server, _, store) = setup();
    let session = login(&server).await;

    let response = server
        .post("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({
            "note": "ci",
            "ip_whitelist": ["10.0.0.0/24"],
            "expire_at": 4_102_444_800_i64,
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let key = created["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("sk-"));
    assert_eq!(created["status"], "active");
    assert_eq!(created["expire_at"], 4_102_444_800_i64);
    assert!(store.save_count() >= 1);

    // Absent expire_at leaves it alone; status can be switched.
    let response = server
        .put("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"key": key, "status": "disabled"}))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["status"], "disabled");
    assert_eq!(updated["expire_at"], 4_102_444_800_i64);

    // Explicit null clears it.
    let response = server
        .put("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"key": key, "expire_at": null}))
        .await;
    response.assert_status_ok();
    assert!(response.json::<Value>()["expire_at"].is_null());

    let response = server
        .get("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .await;
    response.assert_status_ok();
    let list: Value = response.json();
    assert_eq!(list["total"], 1);
    assert_eq!(list["data"][0]["key"], key.as_str());

    let stats: Value = server
        .get("/api-keys/stats")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .json();
    assert_eq!(stats, json!({"total": 1, "active": 0, "disabled": 1, "expired": 0}));

    server
        .delete("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"key": key}))
        .await
        .assert_status_ok();

    let response = server
        .delete("/api-keys")
        .add_header(AUTHORIZATION, session)
        .json(&json!({"key": key}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "not_found");
}

#[tokio::test]
async fn invalid_input_is_bad_request() {
    let (server, _, _) = setup();
    let session = login(&server).await;

    let response = server
        .post("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"ip_whitelist": ["10.0.0.0/99"]}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "bad_request");

    let response = server
        .post("/api-keys")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"expire_at": "tomorrow"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .put("/api-keys")
        .add_header(AUTHORIZATION, session)
        .json(&json!({"key": "sk-missing", "status": "expired"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn store_outage_is_retryable() {
    let (server, _, store) = setup();
    let session = login(&server).await;

    store.set_unavailable(true);
    let response = server
        .post("/api-keys")
        .add_header(AUTHORIZATION, session)
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["error"]["code"], "store_unavailable");
}

#[tokio::test]
async fn token_pool_endpoints() {
    let (server, _, _) = setup();
    let session = login(&server).await;

    let response = server
        .post("/tokens")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"tokens": ["tok-a", "tok-b", " "], "token_type": "sso"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["total"], 2);

    let response = server
        .post("/tokens/config")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"token": "tok-a", "token_type": "sso", "proxy_url": "socks5://own:1080"}))
        .await;
    response.assert_status_ok();
    let record: Value = response.json();
    assert_eq!(record["effective"]["proxy_url"], "socks5://own:1080");
    assert_eq!(record["effective"]["edge_clearance"], "global-clearance");

    let response = server
        .post("/tokens/config")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"token": "tok-a", "token_type": "sso", "proxy_url": "ftp://nope"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/tokens/tags")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"token": "tok-b", "token_type": "sso", "tags": ["eu", "fast"]}))
        .await
        .assert_status_ok();

    let tags: Value = server
        .get("/tokens/tags")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .json();
    assert_eq!(tags["tags"], json!(["eu", "fast"]));

    let list: Value = server
        .get("/tokens")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .json();
    assert_eq!(list["data"][1]["effective"]["proxy_url"], "http://global-proxy:3128");

    let stats: Value = server
        .get("/tokens/stats")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .json();
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["normal"]["unused"], 2);

    let response = server
        .delete("/tokens")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"tokens": ["tok-a"], "token_type": "ssoSuper"}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server
        .delete("/tokens")
        .add_header(AUTHORIZATION, session)
        .json(&json!({"tokens": ["tok-a"], "token_type": "sso"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["deleted"], 1);
}

#[tokio::test]
async fn settings_change_global_fallback() {
    let (server, _, store) = setup();

    server
        .get("/settings")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let session = login(&server).await;
    let current: Value = server
        .get("/settings")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .json();
    assert_eq!(current["proxy_url"], "http://global-proxy:3128");
    assert_eq!(current["edge_clearance"], "global-clearance");

    server
        .post("/tokens")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"tokens": ["tok-a"], "token_type": "sso"}))
        .await
        .assert_status(StatusCode::CREATED);

    let saves = store.save_count();
    let response = server
        .post("/settings")
        .add_header(AUTHORIZATION, session.clone())
        .json(&json!({"proxy_url": "socks5://new-global:1080", "cf_clearance": null}))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["proxy_url"], "socks5://new-global:1080");
    assert!(updated["edge_clearance"].is_null());
    assert_eq!(store.save_count(), saves + 1);

    let list: Value = server
        .get("/tokens")
        .add_header(AUTHORIZATION, session.clone())
        .await
        .json();
    let effective = &list["data"][0]["effective"];
    assert_eq!(effective["proxy_url"], "socks5://new-global:1080");
    assert!(effective["edge_clearance"].is_null());

    let response = server
        .post("/settings")
        .add_header(AUTHORIZATION, session)
        .json(&json!({"cache_proxy_url": "ftp://nope"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn storage_mode_reports_backend() {
    let (server, _, _) = setup();
    let session = login(&server).await;

    let response = server
        .get("/storage/mode")
        .add_header(AUTHORIZATION, session)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["mode"], "file");
}

async fn whoami(Extension(caller): Extension<ApiCaller>) -> String {
    caller.client_ip.to_string()
}

#[tokio::test]
async fn api_key_middleware() {
    let (admin, state, _) = setup();
    let session = login(&admin).await;

    let created: Value = admin
        .post("/api-keys")
        .add_header(AUTHORIZATION, session)
        .json(&json!({"ip_whitelist": ["192.168.1.0/24"]}))
        .await
        .json();
    let key = created["key"].as_str().unwrap().to_string();

    let api = TestServer::new(protect_with_api_key(
        Router::new().route("/v1/whoami", get(whoami)),
        state.clone(),
    ))
    .unwrap();
    let real_ip = HeaderName::from_static(X_REAL_IP);

    let response = api
        .get("/v1/whoami")
        .add_header(AUTHORIZATION, bearer(&key))
        .add_header(real_ip.clone(), HeaderValue::from_static("192.168.1.50"))
        .await;
    response.assert_status_ok();
    response.assert_text("192.168.1.50");

    let response = api
        .get("/v1/whoami")
        .add_header(AUTHORIZATION, bearer(&key))
        .add_header(real_ip.clone(), HeaderValue::from_static("8.8.8.8"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["message"], "unauthorized");

    let response = api
        .get("/v1/whoami")
        .add_header(real_ip.clone(), HeaderValue::from_static("192.168.1.50"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    // Dual-stack listeners report IPv4 clients in mapped form.
    let response = api
        .get("/v1/whoami")
        .add_header(AUTHORIZATION, bearer(&key))
        .add_header(real_ip.clone(), HeaderValue::from_static("::ffff:192.168.1.77"))
        .await;
    response.assert_status_ok();

    // Once disabled, the same caller is turned away.
    state
        .keys
        .update(
            &key,
            keygate_control::UpdateKeyRequest {
                status: Some(keygate_control::KeyStatus::Disabled),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let response = api
        .get("/v1/whoami")
        .add_header(AUTHORIZATION, bearer(&key))
        .add_header(real_ip, HeaderValue::from_static("192.168.1.50"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn keys_survive_restart_on_file_backend() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = config();
    config.store.data_dir = dir.path().to_path_buf();

    let store = keygate_store::open_store(&config.store).unwrap();
    let state = GatewayState::from_store(store, config.clone());
    let server = TestServer::new(create_router(state)).unwrap();
    let session = login(&server).await;
    let created: Value = server
        .post("/api-keys")
        .add_header(AUTHORIZATION, session)
        .json(&json!({"note": "persisted"}))
        .await
        .json();

    let store = keygate_store::open_store(&config.store).unwrap();
    let state = GatewayState::from_store(store, config);
    assert_eq!(state.keys.reload().await.unwrap(), 1);

    let server = TestServer::new(create_router(state)).unwrap();
    let session = login(&server).await;
    let list: Value = server
        .get("/api-keys")
        .add_header(AUTHORIZATION, session)
        .await
        .json();
    assert_eq!(list["data"][0]["key"], created["key"]);
    assert_eq!(list["data"][0]["note"], "persisted");
}
