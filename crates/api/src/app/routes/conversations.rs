//! Conversation AI-state endpoints and the outbound message/file path.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use assistsync_auth::Permission;
use assistsync_core::ConversationId;
use assistsync_infra::store::{ConversationStateStore, MessageBody, MessageGateway, NewMessage};

use crate::app::dto::{CreateConversationRequest, SendMessageRequest, SetAiActiveRequest, UploadFileRequest};
use crate::app::errors::{authz_error_to_response, json_error, store_error_to_response, toggle_error_to_response};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id/ai-state", get(ai_state).patch(set_ai_state))
        .route("/:id/archive", post(archive))
        .route("/:id/messages", get(list_messages).post(send_message))
        .route("/:id/files", post(upload_file))
}

async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.engine().conversations().list(tenant.tenant_id()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateConversationRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::conversations_write()) {
        return authz_error_to_response(e);
    }

    match services
        .engine()
        .create_conversation(tenant.tenant_id(), body.conversation_id)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

async fn ai_state(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services
        .engine()
        .conversation_state(tenant.tenant_id(), ConversationId::new(id))
        .await
    {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "not_found", "conversation not found"),
        Err(e) => store_error_to_response(e),
    }
}

async fn set_ai_state(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    Json(body): Json<SetAiActiveRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::conversations_write()) {
        return authz_error_to_response(e);
    }

    match services
        .engine()
        .set_ai_active(tenant.tenant_id(), ConversationId::new(id), body.ai_active)
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => toggle_error_to_response(e),
    }
}

async fn archive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::conversations_write()) {
        return authz_error_to_response(e);
    }

    match services
        .engine()
        .archive_conversation(tenant.tenant_id(), ConversationId::new(id))
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

async fn list_messages(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services
        .engine()
        .messages()
        .list_messages(tenant.tenant_id(), ConversationId::new(id))
        .await
    {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

async fn send_message(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> axum::response::Response {
    if body.text.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "text must not be empty");
    }
    outbound(services, tenant, principal, id, MessageBody::Text { text: body.text }).await
}

async fn upload_file(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    Json(body): Json<UploadFileRequest>,
) -> axum::response::Response {
    if body.file_name.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "file_name must not be empty");
    }
    let file = MessageBody::File {
        file_name: body.file_name,
        content_type: body.content_type,
        size_bytes: body.size_bytes,
    };
    outbound(services, tenant, principal, id, file).await
}

/// Shared by the text and file handlers so both pause the assistant the same way.
async fn outbound(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    id: i64,
    body: MessageBody,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &Permission::conversations_write()) {
        return authz_error_to_response(e);
    }

    let message = NewMessage::from_user(tenant.tenant_id(), ConversationId::new(id), principal.user_id(), body);
    match services.engine().record_outbound_message(message, Utc::now()).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => store_error_to_response(e),
    }
}
