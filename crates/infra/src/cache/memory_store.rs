use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::store::{CacheStore, CacheStoreError, glob_match};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache store for tests/dev.
///
/// Availability can be toggled to exercise degradation paths.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    available: AtomicBool,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        match self.entries.read() {
            Ok(map) => map.values().filter(|e| e.expires_at > now).count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted. Test helper.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = match self.entries.read() {
            Ok(map) => map
                .iter()
                .filter(|(_, e)| e.expires_at > now)
                .map(|(k, _)| k.clone())
                .collect(),
            Err(_) => vec![],
        };
        keys.sort();
        keys
    }

    fn ensure_available(&self) -> Result<(), CacheStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheStoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }

    fn poisoned() -> CacheStoreError {
        CacheStoreError::Command("lock poisoned".to_string())
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        self.ensure_available()?;
        let map = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(map
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError> {
        self.ensure_available()?;
        let mut map = self.entries.write().map_err(|_| Self::poisoned())?;
        let now = Instant::now();
        map.retain(|_, e| e.expires_at > now);
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
        self.ensure_available()?;
        let mut map = self.entries.write().map_err(|_| Self::poisoned())?;
        Ok(map.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheStoreError> {
        self.ensure_available()?;
        let mut map = self.entries.write().map_err(|_| Self::poisoned())?;
        let before = map.len();
        map.retain(|k, _| !glob_match(pattern, k));
        Ok((before - map.len()) as u64)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
