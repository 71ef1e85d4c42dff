//! Realtime surface: an authenticated SSE stream per session plus room
//! membership endpoints.
//!
//! A stream registers a session with the hub, joins the tenant room and any
//! `conversation=<id>` rooms from the query, and is removed from the hub when
//! the client goes away.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Extension, Path, RawQuery},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{delete, get, post},
    Json, Router,
};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};

use assistsync_core::ConversationId;
use assistsync_events::{RealtimeEvent, Room, SessionId};

use crate::app::dto::JoinRoomRequest;
use crate::app::errors::{fanout_error_to_response, json_error};
use crate::app::services::AppServices;
use crate::context::TenantContext;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub fn router() -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/sessions/:session/rooms", post(join_room))
        .route("/sessions/:session/rooms/:conversation", delete(leave_room))
}

/// Conversation ids listed as repeated `conversation=` query parameters.
pub fn conversation_rooms(query: Option<&str>) -> Result<Vec<ConversationId>, String> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| *name == "conversation")
        .map(|(_, value)| {
            value
                .parse::<i64>()
                .map(ConversationId::new)
                .map_err(|_| format!("invalid conversation id {value:?}"))
        })
        .collect()
}

async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    RawQuery(query): RawQuery,
) -> axum::response::Response {
    let conversations = match conversation_rooms(query.as_deref()) {
        Ok(ids) => ids,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    let hub = services.hub();
    let session = hub.connect(tenant.tenant_id());
    for conversation_id in conversations {
        if let Err(e) = hub.join(session.id(), Room::conversation(tenant.tenant_id(), conversation_id)) {
            return fanout_error_to_response(e);
        }
    }

    tracing::debug!(tenant_id = %tenant.tenant_id(), session = %session.id(), "realtime session opened");
    Sse::new(session_stream(session))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
        .into_response()
}

fn session_stream(
    session: assistsync_events::SessionHandle,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let session_id = session.id();
    let (guard, rx) = session.split();

    let connected = SseEvent::default()
        .event("connected")
        .data(serde_json::json!({ "session_id": session_id.get() }).to_string());

    let events = ReceiverStream::new(rx).map(move |event| {
        // The guard lives as long as the stream; dropping it leaves every room.
        let _ = &guard;
        Ok(to_sse(&event))
    });

    tokio_stream::once(Ok(connected)).chain(events)
}

fn to_sse(event: &RealtimeEvent) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default()
        .event(event.event_type.as_str())
        .id(event.event_id.to_string())
        .data(data)
}

async fn join_room(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(session): Path<u64>,
    Json(body): Json<JoinRoomRequest>,
) -> axum::response::Response {
    let room = Room::conversation(tenant.tenant_id(), body.conversation_id);
    match services.hub().join(SessionId::new(session), room) {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "room": room.name() }))).into_response(),
        Err(e) => fanout_error_to_response(e),
    }
}

async fn leave_room(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((session, conversation)): Path<(u64, i64)>,
) -> axum::response::Response {
    let room = Room::conversation(tenant.tenant_id(), ConversationId::new(conversation));
    match services.hub().leave(SessionId::new(session), &room) {
        Ok(left) => Json(serde_json::json!({ "room": room.name(), "left": left })).into_response(),
        Err(e) => fanout_error_to_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_rooms_are_read_from_repeated_parameters() {
        let ids = conversation_rooms(Some("conversation=4&x=1&conversation=9")).unwrap();
        assert_eq!(ids, vec![ConversationId::new(4), ConversationId::new(9)]);
        assert!(conversation_rooms(None).unwrap().is_empty());
    }

    #[test]
    fn malformed_conversation_id_is_rejected() {
        assert!(conversation_rooms(Some("conversation=abc")).is_err());
    }
}
