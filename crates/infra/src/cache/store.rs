//! Cache store adapter abstraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store command failed: {0}")]
    Command(String),
}

/// Thin key/value interface over an external store.
///
/// Values are opaque strings (serialized JSON). Patterns support `*` only.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheStoreError>;

    /// Returns the number of removed keys.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheStoreError>;

    /// Last known availability. Cheap; never performs IO.
    fn is_available(&self) -> bool;
}

#[async_trait]
impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
        (**self).delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheStoreError> {
        (**self).delete_pattern(pattern).await
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Glob match supporting `*` (any run of characters, including empty).
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !key.starts_with(first) || key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}
