//! `assistsync-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, the domain error model and the tenant context seam.

pub mod error;
pub mod id;
pub mod tenant;

pub use error::{DomainError, DomainResult};
pub use id::{ChannelId, ConversationId, EventId, TenantId, UserId};
pub use tenant::{FixedTenant, TenantContextProvider};
