//! Client-side reconciliation of optimistic conversation actions.
//!
//! - [`types`]: conversation views, action kinds and pending-action records.
//! - [`transport`]: the authoritative API behind an [`ActionTransport`] seam.
//! - [`reconcile`]: the optimistic action layer (single flight, rollback, retry).
//! - [`sse`]: realtime event-stream parsing.
//! - [`offline`]: connectivity tracking.

pub mod offline;
pub mod reconcile;
pub mod sse;
pub mod transport;
pub mod types;

pub use offline::{Connectivity, ConnectivityState};
pub use reconcile::{AttemptError, ClientConfig, EventEffect, OptimisticActionFailure, ReconciliationLayer};
pub use sse::{EventStream, SseFrame, SseParser, StreamItem};
pub use transport::{ActionTransport, HttpTransport, TransportError};
pub use types::{ActionKind, ActionStatus, Affordance, AffordanceKind, ConversationView, PendingAction};
