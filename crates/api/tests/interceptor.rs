//! Router-level tests for the cache interceptor over a stub `/contacts` module.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    body::{Body, to_bytes},
    extract::Extension,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tower::ServiceExt;

use assistsync_api::{interceptor, middleware};
use assistsync_auth::{Hs256JwtValidator, JwtClaims, Role};
use assistsync_core::{TenantId, UserId};
use assistsync_infra::TaskLocalTenant;
use assistsync_infra::cache::{CacheMetrics, CachePolicyTable, CacheService, InMemoryCacheStore};

const SECRET: &[u8] = b"interceptor-secret";

#[derive(Default)]
struct Calls(AtomicUsize);

async fn list_contacts(Extension(calls): Extension<Arc<Calls>>) -> impl IntoResponse {
    calls.0.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "items": [1, 2, 3, 4, 5] }))
}

async fn create_contact() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({ "id": 6 })))
}

async fn failing_list() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

struct Harness {
    app: Router,
    store: Arc<InMemoryCacheStore>,
    calls: Arc<Calls>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCacheStore::new());
    let cache = Arc::new(CacheService::new(
        store.clone(),
        Arc::new(CachePolicyTable::defaults()),
        Arc::new(TaskLocalTenant),
        Arc::new(CacheMetrics::default()),
    ));
    let calls = Arc::new(Calls::default());
    let auth_state = middleware::AuthState {
        jwt: Arc::new(Hs256JwtValidator::new(SECRET.to_vec())),
    };

    let app = Router::new()
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/forms", get(failing_list))
        .route("/health", get(|| async { "ok" }))
        .layer(axum::middleware::from_fn_with_state(cache, interceptor::cache_interceptor))
        .layer(Extension(calls.clone()))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    Harness { app, store, calls }
}

fn token(tenant: i64) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(1),
        tenant_id: TenantId::new(tenant),
        roles: vec![Role::professional()],
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(5),
    };
    Hs256JwtValidator::new(SECRET.to_vec()).sign(&claims).unwrap()
}

fn request(method: &str, uri: &str, tenant: i64) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token(tenant)))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let cache = res
        .headers()
        .get(interceptor::CACHE_STATUS_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, cache, body)
}

#[tokio::test]
async fn list_read_is_cached_then_invalidated_by_a_write() {
    let h = harness();

    let (status, cache, first) = send(&h.app, request("GET", "/contacts?tenant=9&page=1", 9)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(first["items"].as_array().unwrap().len(), 5);
    assert_eq!(h.store.keys(), vec!["tenant_9:contacts:list:page=1".to_string()]);

    let (status, cache, second) = send(&h.app, request("GET", "/contacts?tenant=9&page=1", 9)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(second, first);
    assert_eq!(h.calls.0.load(Ordering::SeqCst), 1);

    let (status, _, _) = send(&h.app, request("POST", "/contacts", 9)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(h.store.is_empty());

    let (_, cache, _) = send(&h.app, request("GET", "/contacts?tenant=9&page=1", 9)).await;
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(h.calls.0.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn page_and_search_produce_distinct_keys() {
    let h = harness();

    send(&h.app, request("GET", "/contacts?page=1", 9)).await;
    send(&h.app, request("GET", "/contacts?page=2", 9)).await;
    send(&h.app, request("GET", "/contacts?search=ana&page=1", 9)).await;

    assert_eq!(
        h.store.keys(),
        vec![
            "tenant_9:contacts:list:page=1".to_string(),
            "tenant_9:contacts:list:page=1&search=ana".to_string(),
            "tenant_9:contacts:list:page=2".to_string(),
        ]
    );
}

#[tokio::test]
async fn tenants_get_separate_entries_and_writes_only_touch_their_own() {
    let h = harness();

    send(&h.app, request("GET", "/contacts", 9)).await;
    send(&h.app, request("GET", "/contacts", 10)).await;
    send(&h.app, request("POST", "/contacts", 10)).await;

    assert_eq!(h.store.keys(), vec!["tenant_9:contacts:list".to_string()]);
}

#[tokio::test]
async fn failed_reads_and_excluded_paths_are_not_cached() {
    let h = harness();

    let (status, cache, _) = send(&h.app, request("GET", "/forms", 9)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(cache.as_deref(), Some("MISS"));

    let (status, cache, _) = send(&h.app, request("GET", "/health", 9)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache, None);

    assert!(h.store.is_empty());
}

#[tokio::test]
async fn unavailable_store_degrades_to_uncached_success() {
    let h = harness();
    h.store.set_available(false);

    let (status, cache, body) = send(&h.app, request("GET", "/contacts", 9)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(body["items"].as_array().unwrap().len(), 5);

    let (status, _, _) = send(&h.app, request("POST", "/contacts", 9)).await;
    assert_eq!(status, StatusCode::CREATED);
}
