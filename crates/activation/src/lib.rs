//! Assistant activation rules.
//!
//! This crate decides whether the assistant may auto-respond in a tenant's
//! conversations, implemented purely as deterministic logic (no IO, no HTTP,
//! no storage). The infra layer loads the inputs, calls into these rules and
//! persists the outcome.
//!
//! - [`link`]: tenant-level verdict from the channel-link configuration.
//! - [`state`]: per-conversation AI state and its pause/reactivate transitions.
//! - [`message`]: the pause-on-human-intervention decision.

pub mod link;
pub mod message;
pub mod state;

pub use link::{ActivationReason, ActivationVerdict, ChannelLinkConfig, ChannelRecord, evaluate};
pub use message::{MessageKind, MessageSender, PauseDecision, PauseSkip, decide_pause};
pub use state::{ConversationAiState, PausePolicy, PauseReason, ReactivationDecision};
