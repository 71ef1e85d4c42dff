use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "conversations.write").
/// The wildcard permission `"*"` means "allow all within the tenant".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Save the assistant link configuration or channel status.
    pub fn ai_config_write() -> Self {
        Self::new("ai_config.write")
    }

    /// Flush tenant cache entries.
    pub fn cache_admin() -> Self {
        Self::new("cache.admin")
    }

    /// Send messages, toggle the assistant, archive conversations.
    pub fn conversations_write() -> Self {
        Self::new("conversations.write")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
