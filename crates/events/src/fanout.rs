//! Fanout publishing abstraction (mechanics only).
//!
//! Publishers (message handlers, the rule engine, the expiry reconciler) only
//! see [`FanoutChannel`]. The in-process hub implements it directly; a
//! cross-instance bridge can wrap the hub and forward over a broker.
//!
//! ## Delivery
//!
//! - **At-most-once**: an event reaches each connected session in the room once, or not at all
//! - **No persistence, no acks, no retries**
//! - **Publish never fails the caller**: the return value is a delivery count for logging

use std::sync::Arc;

use thiserror::Error;

use crate::{RealtimeEvent, Room};

/// Identifier of a connected session (one SSE stream, one browser tab).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for SessionId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FanoutError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("room {room} does not belong to the session's tenant")]
    TenantMismatch { room: String },
}

/// Publishes realtime events to rooms.
pub trait FanoutChannel: Send + Sync {
    /// Deliver `event` once to every session joined to at least one of `rooms`.
    ///
    /// Returns the number of sessions the event was handed to. Rooms and events
    /// must agree on the tenant; mismatching rooms are skipped.
    fn publish_to(&self, rooms: &[Room], event: RealtimeEvent) -> usize;

    fn publish(&self, room: &Room, event: RealtimeEvent) -> usize {
        self.publish_to(std::slice::from_ref(room), event)
    }
}

impl<F> FanoutChannel for Arc<F>
where
    F: FanoutChannel + ?Sized,
{
    fn publish_to(&self, rooms: &[Room], event: RealtimeEvent) -> usize {
        (**self).publish_to(rooms, event)
    }
}
