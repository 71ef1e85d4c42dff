//! Cache administration. These paths are never intercepted.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};

use assistsync_auth::Permission;
use assistsync_infra::cache::CacheDomain;

use crate::app::dto::{CacheStatsResponse, InvalidationResponse, PolicyView};
use crate::app::errors::{authz_error_to_response, json_error};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", delete(clear_tenant))
        .route("/stats", get(stats))
        .route("/:domain", delete(clear_domain))
}

async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::cache_admin()) {
        return authz_error_to_response(e);
    }

    let cache = services.cache();
    Json(CacheStatsResponse {
        metrics: cache.metrics(),
        available: cache.is_available(),
        policies: cache.policies().iter().map(PolicyView::from).collect(),
    })
    .into_response()
}

async fn clear_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::cache_admin()) {
        return authz_error_to_response(e);
    }

    let result = services.cache().invalidate_tenant().await;
    tracing::info!(tenant_id = %tenant.tenant_id(), ?result, "tenant cache cleared");
    Json(InvalidationResponse::from_result(result)).into_response()
}

async fn clear_domain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(domain): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::cache_admin()) {
        return authz_error_to_response(e);
    }
    let Some(domain) = CacheDomain::parse(&domain) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid_domain", format!("unknown cache domain {domain:?}"));
    };

    Json(InvalidationResponse::from_result(services.cache().invalidate_domain(domain).await)).into_response()
}
