//! Realtime fanout: state-changed events delivered to subscribed sessions.
//!
//! Delivery is **best-effort, at-most-once** per connected session. A session
//! that is offline (or too slow) at publish time never sees the event and must
//! resynchronize through a normal fetch. Nothing here is a source of truth.

pub mod event;
pub mod fanout;
pub mod hub;
pub mod room;
pub mod tenant;

pub use event::{RealtimeEvent, RealtimeEventType};
pub use fanout::{FanoutChannel, FanoutError, SessionId};
pub use hub::{FanoutHub, SessionGuard, SessionHandle};
pub use room::Room;
pub use tenant::TenantScoped;
