//! In-process room hub.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::mpsc;

use assistsync_core::TenantId;

use crate::fanout::{FanoutChannel, FanoutError, SessionId};
use crate::{RealtimeEvent, Room};

/// Per-session buffer. A session that falls this far behind loses events.
const DEFAULT_SESSION_BUFFER: usize = 64;

#[derive(Debug)]
struct SessionEntry {
    tenant_id: TenantId,
    rooms: HashSet<Room>,
    tx: mpsc::Sender<RealtimeEvent>,
}

#[derive(Debug, Default)]
struct HubInner {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn remove(&self, id: SessionId) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&id);
        }
    }
}

/// In-memory pub/sub hub with tenant and conversation rooms.
///
/// - Sessions join their tenant room on connect
/// - Conversation rooms are joined explicitly and must belong to the session's tenant
/// - Best-effort fan-out: full or closed session buffers drop the event
#[derive(Debug, Clone)]
pub struct FanoutHub {
    inner: Arc<HubInner>,
    buffer: usize,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SESSION_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner::default()),
            buffer: buffer.max(1),
        }
    }

    /// Register a session for an authenticated tenant and join its tenant room.
    pub fn connect(&self, tenant_id: TenantId) -> SessionHandle {
        let id = SessionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::channel(self.buffer);

        let mut rooms = HashSet::new();
        rooms.insert(Room::tenant(tenant_id));

        if let Ok(mut sessions) = self.inner.sessions.write() {
            sessions.insert(id, SessionEntry { tenant_id, rooms, tx });
        }
        tracing::debug!(session = %id, tenant_id = %tenant_id, "realtime session connected");

        SessionHandle {
            id,
            tenant_id,
            rx,
            guard: SessionGuard {
                id,
                hub: Arc::downgrade(&self.inner),
            },
        }
    }

    pub fn join(&self, session: SessionId, room: Room) -> Result<(), FanoutError> {
        let mut sessions = self
            .inner
            .sessions
            .write()
            .map_err(|_| FanoutError::UnknownSession(session))?;
        let entry = sessions
            .get_mut(&session)
            .ok_or(FanoutError::UnknownSession(session))?;

        if entry.tenant_id != room.tenant_id() {
            tracing::warn!(
                session = %session,
                tenant_id = %entry.tenant_id,
                room = %room,
                "refusing cross-tenant room join"
            );
            return Err(FanoutError::TenantMismatch { room: room.name() });
        }

        entry.rooms.insert(room);
        Ok(())
    }

    /// Leave a room. The tenant room cannot be left; only disconnecting does that.
    pub fn leave(&self, session: SessionId, room: &Room) -> Result<bool, FanoutError> {
        let mut sessions = self
            .inner
            .sessions
            .write()
            .map_err(|_| FanoutError::UnknownSession(session))?;
        let entry = sessions
            .get_mut(&session)
            .ok_or(FanoutError::UnknownSession(session))?;

        if matches!(room, Room::Tenant { .. }) {
            return Ok(false);
        }
        Ok(entry.rooms.remove(room))
    }

    pub fn disconnect(&self, session: SessionId) {
        self.inner.remove(session);
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn room_size(&self, room: &Room) -> usize {
        self.inner
            .sessions
            .read()
            .map(|s| s.values().filter(|e| e.rooms.contains(room)).count())
            .unwrap_or(0)
    }
}

impl FanoutChannel for FanoutHub {
    fn publish_to(&self, rooms: &[Room], event: RealtimeEvent) -> usize {
        let rooms: Vec<&Room> = rooms
            .iter()
            .filter(|room| {
                let same = room.tenant_id() == event.tenant_id;
                if !same {
                    tracing::warn!(
                        room = %room,
                        tenant_id = %event.tenant_id,
                        "dropping publish to a room of another tenant"
                    );
                }
                same
            })
            .collect();
        if rooms.is_empty() {
            return 0;
        }

        let mut delivered = 0usize;
        let mut closed = Vec::new();
        {
            let sessions = match self.inner.sessions.read() {
                Ok(s) => s,
                Err(_) => return 0,
            };

            for (id, entry) in sessions.iter() {
                if entry.tenant_id != event.tenant_id {
                    continue;
                }
                if !rooms.iter().any(|room| entry.rooms.contains(*room)) {
                    continue;
                }
                match entry.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(session = %id, event_type = %event.event_type, "session buffer full; event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        // Drop any dead sessions while publishing.
        for id in closed {
            self.inner.remove(id);
        }

        delivered
    }
}

/// Removes its session from the hub when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    id: SessionId,
    hub: Weak<HubInner>,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
            tracing::debug!(session = %self.id, "realtime session closed");
        }
    }
}

/// A connected session: its receive side plus the registration guard.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    tenant_id: TenantId,
    rx: mpsc::Receiver<RealtimeEvent>,
    guard: SessionGuard,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }

    /// Split into the guard (keep it alive as long as the stream) and the receiver.
    pub fn split(self) -> (SessionGuard, mpsc::Receiver<RealtimeEvent>) {
        (self.guard, self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RealtimeEventType;
    use assistsync_core::ConversationId;

    fn tenant(id: i64) -> TenantId {
        TenantId::new(id)
    }

    fn list_updated(t: TenantId) -> RealtimeEvent {
        RealtimeEvent::tenant(RealtimeEventType::ConversationListUpdated, t, serde_json::json!({}))
    }

    #[test]
    fn tenant_room_receives_tenant_events_only() {
        let hub = FanoutHub::new();
        let mut a = hub.connect(tenant(1));
        let mut b = hub.connect(tenant(2));

        let delivered = hub.publish(&Room::tenant(tenant(1)), list_updated(tenant(1)));
        assert_eq!(delivered, 1);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn mismatched_room_and_event_tenant_is_dropped() {
        let hub = FanoutHub::new();
        let mut a = hub.connect(tenant(1));
        assert_eq!(hub.publish(&Room::tenant(tenant(1)), list_updated(tenant(2))), 0);
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn conversation_room_requires_explicit_join() {
        let hub = FanoutHub::new();
        let mut joined = hub.connect(tenant(1));
        let mut other = hub.connect(tenant(1));
        let room = Room::conversation(tenant(1), ConversationId::new(42));
        hub.join(joined.id(), room).unwrap();

        let ev = RealtimeEvent::conversation(
            RealtimeEventType::MessageNew,
            tenant(1),
            ConversationId::new(42),
            serde_json::json!({"text": "hi"}),
        );
        assert_eq!(hub.publish(&room, ev), 1);
        assert!(joined.try_recv().is_some());
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn cross_tenant_join_is_refused() {
        let hub = FanoutHub::new();
        let s = hub.connect(tenant(1));
        let err = hub
            .join(s.id(), Room::conversation(tenant(2), ConversationId::new(7)))
            .unwrap_err();
        assert!(matches!(err, FanoutError::TenantMismatch { .. }));
    }

    #[test]
    fn multi_room_publish_delivers_once_per_session() {
        let hub = FanoutHub::new();
        let mut s = hub.connect(tenant(1));
        let conv = Room::conversation(tenant(1), ConversationId::new(42));
        hub.join(s.id(), conv).unwrap();

        let ev = RealtimeEvent::conversation(
            RealtimeEventType::AiReactivated,
            tenant(1),
            ConversationId::new(42),
            serde_json::json!({}),
        );
        assert_eq!(hub.publish_to(&[conv, Room::tenant(tenant(1))], ev), 1);
        assert!(s.try_recv().is_some());
        assert!(s.try_recv().is_none());
    }

    #[test]
    fn dropped_session_is_unregistered_and_misses_events() {
        let hub = FanoutHub::new();
        let s = hub.connect(tenant(1));
        assert_eq!(hub.session_count(), 1);
        drop(s);
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.publish(&Room::tenant(tenant(1)), list_updated(tenant(1))), 0);
    }

    #[test]
    fn slow_session_loses_overflow() {
        let hub = FanoutHub::with_buffer(1);
        let mut s = hub.connect(tenant(1));
        assert_eq!(hub.publish(&Room::tenant(tenant(1)), list_updated(tenant(1))), 1);
        assert_eq!(hub.publish(&Room::tenant(tenant(1)), list_updated(tenant(1))), 0);
        assert!(s.try_recv().is_some());
        assert!(s.try_recv().is_none());
    }

    #[test]
    fn tenant_room_cannot_be_left() {
        let hub = FanoutHub::new();
        let s = hub.connect(tenant(1));
        assert!(!hub.leave(s.id(), &Room::tenant(tenant(1))).unwrap());
        assert_eq!(hub.room_size(&Room::tenant(tenant(1))), 1);
    }
}
