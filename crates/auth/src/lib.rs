//! `assistsync-auth`: authentication and tenant-scoped authorization.
//!
//! This crate is intentionally decoupled from HTTP and storage. Authorization
//! is limited to tenant scoping plus a coarse role→permission mapping.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator, TokenError};
pub use permissions::Permission;
pub use roles::Role;
