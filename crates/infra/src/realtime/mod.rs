//! Cross-instance realtime fanout.
//!
//! Each API instance owns a local [`FanoutHub`](assistsync_events::FanoutHub).
//! With Redis enabled, events published on one instance are relayed to every
//! other instance's hub over a pub/sub channel. Still best-effort: nothing is
//! persisted and offline instances miss events.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use assistsync_events::{RealtimeEvent, Room};

#[cfg(feature = "redis")]
pub mod redis_bridge;

#[cfg(feature = "redis")]
pub use redis_bridge::{RedisBridgeError, RedisFanoutBridge};

/// Wire frame relayed between instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeFrame {
    /// Instance that published the frame; it already delivered locally.
    pub origin: String,
    pub rooms: Vec<Room>,
    pub event: RealtimeEvent,
}

impl BridgeFrame {
    /// Frames from this instance are skipped on the receive side.
    pub fn is_foreign(&self, origin: &str) -> bool {
        self.origin != origin
    }
}

const RESUBSCRIBE_BASE: Duration = Duration::from_millis(500);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

/// Wait before the relay subscriber reconnects after `failures` consecutive errors.
pub fn resubscribe_delay(failures: u32) -> Duration {
    std::cmp::min(RESUBSCRIBE_BASE * (1 << failures.min(6)), RESUBSCRIBE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistsync_core::{ConversationId, TenantId};
    use assistsync_events::RealtimeEventType;
    use serde_json::json;

    #[test]
    fn frame_survives_the_wire_and_knows_its_origin() {
        let t = TenantId::new(9);
        let frame = BridgeFrame {
            origin: "node-a".into(),
            rooms: vec![Room::tenant(t), Room::conversation(t, ConversationId::new(42))],
            event: RealtimeEvent::conversation(RealtimeEventType::MessageNew, t, ConversationId::new(42), json!({})),
        };
        let wire = serde_json::to_string(&frame).unwrap();
        let back: BridgeFrame = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, frame);
        assert!(!back.is_foreign("node-a"));
        assert!(back.is_foreign("node-b"));
    }

    #[test]
    fn resubscribe_delay_doubles_up_to_the_cap() {
        assert_eq!(resubscribe_delay(0), Duration::from_millis(500));
        assert_eq!(resubscribe_delay(1), Duration::from_secs(1));
        assert_eq!(resubscribe_delay(3), Duration::from_secs(4));
        assert_eq!(resubscribe_delay(6), Duration::from_secs(30));
        assert_eq!(resubscribe_delay(u32::MAX), Duration::from_secs(30));
    }
}
