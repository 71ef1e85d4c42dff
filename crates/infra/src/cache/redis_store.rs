//! Redis-backed cache store (optional).
//!
//! Availability is tracked in a flag: set from the startup `PING` and from
//! every command result. While unavailable, commands short-circuit until the
//! next re-probe is due.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use super::store::{CacheStore, CacheStoreError};

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
const SCAN_BATCH: usize = 200;

pub struct RedisCacheStore {
    client: redis::Client,
    conn: Mutex<Option<ConnectionManager>>,
    available: AtomicBool,
    last_probe: Mutex<Instant>,
    probe_interval: Duration,
}

impl RedisCacheStore {
    /// Open the client and probe once. An unreachable server is not an error:
    /// the store starts unavailable and re-probes later.
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheStoreError::Command(e.to_string()))?;

        let store = Self {
            client,
            conn: Mutex::new(None),
            available: AtomicBool::new(false),
            last_probe: Mutex::new(Instant::now()),
            probe_interval: DEFAULT_PROBE_INTERVAL,
        };
        store.probe().await;
        Ok(store)
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    async fn probe(&self) -> bool {
        if let Ok(mut last) = self.last_probe.lock() {
            *last = Instant::now();
        }

        let result = async {
            let mut conn = ConnectionManager::new(self.client.clone()).await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        }
        .await;

        match result {
            Ok(conn) => {
                if let Ok(mut slot) = self.conn.lock() {
                    *slot = Some(conn);
                }
                if !self.available.swap(true, Ordering::SeqCst) {
                    info!("redis cache store available");
                }
                true
            }
            Err(e) => {
                self.available.store(false, Ordering::SeqCst);
                warn!(error = %e, "redis cache store unreachable");
                false
            }
        }
    }

    fn probe_due(&self) -> bool {
        self.last_probe
            .lock()
            .map(|last| last.elapsed() >= self.probe_interval)
            .unwrap_or(true)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheStoreError> {
        if !self.available.load(Ordering::SeqCst) && !(self.probe_due() && self.probe().await) {
            return Err(CacheStoreError::Unavailable("redis marked unavailable".to_string()));
        }

        let conn = self.conn.lock().ok().and_then(|slot| slot.clone());
        conn.ok_or_else(|| CacheStoreError::Unavailable("no redis connection".to_string()))
    }

    fn fail(&self, e: redis::RedisError) -> CacheStoreError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            self.available.store(false, Ordering::SeqCst);
            CacheStoreError::Unavailable(e.to_string())
        } else {
            CacheStoreError::Command(e.to_string())
        }
    }
}

impl core::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
        let mut conn = self.connection().await?;
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(removed > 0)
    }

    /// SCAN + DEL in batches; never `KEYS`.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheStoreError> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.fail(e))?;

            if !keys.is_empty() {
                let n: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| self.fail(e))?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) || self.probe_due()
    }
}
