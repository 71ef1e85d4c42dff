//! Request interceptor: cache-aside for tenant reads, domain invalidation
//! after successful writes.
//!
//! Runs inside the auth middleware, so the tenant scope is already set when a
//! request reaches it. Cache trouble never changes the response: a failed
//! lookup is a miss and a failed write-back is logged and dropped.
//!
//! Requests are keyed by the tenant from the token, never by a `tenant`
//! query parameter.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::{OriginalUri, State},
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use assistsync_infra::cache::{CacheDomain, CacheKeyBuilder, CacheService};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Paths never served from or written to the cache.
const EXCLUDED_PREFIXES: [&str; 4] = ["/auth", "/health", "/cache", "/realtime"];

/// Bodies above this size are passed through uncached.
const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = (status, self.body).into_response();
        if let Some(value) = self.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

pub fn is_excluded(path: &str) -> bool {
    EXCLUDED_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

/// Cache domain addressed by a request path (first segment).
pub fn domain_for_path(path: &str) -> Option<CacheDomain> {
    let first = path.trim_start_matches('/').split('/').next()?;
    CacheDomain::from_path_segment(first)
}

pub async fn cache_interceptor(State(cache): State<Arc<CacheService>>, req: Request<Body>, next: Next) -> Response {
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|o| o.0.clone())
        .unwrap_or_else(|| req.uri().clone());
    let path = uri.path();

    if is_excluded(path) {
        return next.run(req).await;
    }
    let (Some(domain), Some(tenant_id)) = (domain_for_path(path), cache.current_tenant()) else {
        return next.run(req).await;
    };

    match *req.method() {
        Method::GET => {
            let key = CacheKeyBuilder::for_request(tenant_id, domain, path, uri.query());
            serve_cached(cache, key, domain, req, next).await
        }
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE => {
            let response = next.run(req).await;
            if response.status().is_success() {
                match cache.invalidate_domain(domain).await {
                    Ok(removed) => debug!(tenant_id = %tenant_id, %domain, removed, "invalidated after write"),
                    Err(reason) => debug!(tenant_id = %tenant_id, %domain, %reason, "invalidation skipped"),
                }
            }
            response
        }
        _ => next.run(req).await,
    }
}

async fn serve_cached(
    cache: Arc<CacheService>,
    key: String,
    domain: CacheDomain,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(hit) = cache.get::<CachedResponse>(&key, domain).await {
        return with_cache_status(hit.into_response(), "HIT");
    }

    let response = next.run(req).await;
    if !response.status().is_success() || !fits_cache(&response) {
        return with_cache_status(response, "MISS");
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%key, error = %e, "failed to buffer response body");
            return (StatusCode::INTERNAL_SERVER_ERROR, "response body unavailable").into_response();
        }
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        let entry = CachedResponse {
            status: parts.status.as_u16(),
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: text.to_string(),
        };
        write_back(&cache, &key, domain, entry).await;
    }

    with_cache_status(Response::from_parts(parts, Body::from(bytes)), "MISS")
}

/// Store the entry before the response leaves, so a follow-up write from the
/// same client is ordered after it. Failures only log.
async fn write_back(cache: &CacheService, key: &str, domain: CacheDomain, entry: CachedResponse) {
    if let Err(reason) = cache.set(key, &entry, domain).await {
        debug!(%key, %reason, "response not cached");
    }
}

/// Only bodies with a known, bounded length are buffered. Streams (SSE) are not.
fn fits_cache(response: &Response) -> bool {
    HttpBody::size_hint(response.body())
        .upper()
        .is_some_and(|len| len <= MAX_CACHED_BODY_BYTES as u64)
}

fn with_cache_status(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
    response
}
