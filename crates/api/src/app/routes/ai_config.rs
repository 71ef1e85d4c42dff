//! Tenant assistant-link configuration.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use assistsync_activation::ChannelLinkConfig;
use assistsync_auth::Permission;
use assistsync_core::ChannelId;
use assistsync_infra::store::ChannelDirectory;

use crate::app::dto::{AiConfigResponse, LinkConfigRequest};
use crate::app::errors::{authz_error_to_response, json_error, store_error_to_response};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/", get(get_config).put(put_config))
}

async fn get_config(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let engine = services.engine();
    let config = match engine.channels().link_config(tenant.tenant_id()).await {
        Ok(config) => config.unwrap_or_else(|| ChannelLinkConfig::unlinked(tenant.tenant_id())),
        Err(e) => return store_error_to_response(e),
    };
    let verdict = engine.should_activate(tenant.tenant_id()).await;

    Json(AiConfigResponse { config, verdict }).into_response()
}

async fn put_config(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<LinkConfigRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::ai_config_write()) {
        return authz_error_to_response(e);
    }

    let linked_channel_id = match body.linked_channel_id {
        None => None,
        Some(raw) => match ChannelId::parse(raw) {
            Some(id) => Some(id),
            None => {
                return json_error(StatusCode::BAD_REQUEST, "validation_error", "linked_channel_id must not be blank");
            }
        },
    };

    let config = ChannelLinkConfig {
        tenant_id: tenant.tenant_id(),
        linked_channel_id,
        is_active: body.is_active,
    };
    match services.engine().save_link_config(config).await {
        Ok(applied) => Json(applied).into_response(),
        Err(e) => store_error_to_response(e),
    }
}
