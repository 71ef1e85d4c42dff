//! Live channel status (entry point for the channel-status webhook).

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::put,
    Json, Router,
};

use assistsync_activation::ChannelRecord;
use assistsync_auth::Permission;
use assistsync_core::ChannelId;

use crate::app::dto::ChannelStatusRequest;
use crate::app::errors::{authz_error_to_response, json_error, store_error_to_response};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/:id/status", put(put_status))
}

async fn put_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ChannelStatusRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::ai_config_write()) {
        return authz_error_to_response(e);
    }
    let Some(channel_id) = ChannelId::parse(id) else {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "channel id must not be blank");
    };

    let record = ChannelRecord {
        channel_id,
        tenant_id: tenant.tenant_id(),
        connected: body.connected,
        deleted: body.deleted,
    };
    match services.engine().record_channel_status(record).await {
        Ok(applied) => Json(applied).into_response(),
        Err(e) => store_error_to_response(e),
    }
}
