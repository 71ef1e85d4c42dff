//! Service wiring: stores, cache, fanout and the activation engine.
//!
//! Everything is constructed once here and handed to handlers through an
//! `Extension<Arc<AppServices>>`. `USE_PERSISTENT_STORES=true` selects Postgres
//! stores, the Redis cache and the Redis fanout bridge; otherwise everything
//! is in-memory (dev/test).

use std::sync::Arc;

use assistsync_activation::PausePolicy;
use assistsync_core::TenantContextProvider;
use assistsync_events::{FanoutChannel, FanoutHub};
use assistsync_infra::activation::ActivationRuleEngine;
use assistsync_infra::cache::{CacheMetrics, CachePolicyTable, CacheService, CacheStore, InMemoryCacheStore};
use assistsync_infra::store::{
    ChannelDirectory, ConversationStateStore, InMemoryChannelDirectory, InMemoryConversationStore,
    InMemoryMessageGateway, MessageGateway,
};
use assistsync_infra::{AppConfig, TaskLocalTenant};

#[cfg(feature = "redis")]
use assistsync_infra::{cache::RedisCacheStore, realtime::RedisFanoutBridge, store::PostgresStores};

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    InMemory,
    Persistent,
}

#[derive(Debug)]
pub struct AppServices {
    engine: Arc<ActivationRuleEngine>,
    cache: Arc<CacheService>,
    hub: FanoutHub,
    backend: Backend,
}

impl AppServices {
    pub fn engine(&self) -> &Arc<ActivationRuleEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    /// Local session registry (SSE streams join rooms here).
    pub fn hub(&self) -> &FanoutHub {
        &self.hub
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

struct Stores {
    conversations: Arc<dyn ConversationStateStore>,
    channels: Arc<dyn ChannelDirectory>,
    messages: Arc<dyn MessageGateway>,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    if config.persistent {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!("USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory");
            return Ok(build_in_memory_services(config));
        }
    }

    Ok(build_in_memory_services(config))
}

pub fn build_in_memory_services(config: &AppConfig) -> AppServices {
    let stores = Stores {
        conversations: Arc::new(InMemoryConversationStore::new()),
        channels: Arc::new(InMemoryChannelDirectory::new()),
        messages: Arc::new(InMemoryMessageGateway::new()),
    };
    let hub = FanoutHub::new();
    let fanout: Arc<dyn FanoutChannel> = Arc::new(hub.clone());

    assemble(config, stores, Arc::new(InMemoryCacheStore::new()), hub, fanout, Backend::InMemory)
}

#[cfg(feature = "redis")]
async fn build_persistent_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true"))?;

    let pg = Arc::new(PostgresStores::connect(database_url).await?);
    let stores = Stores {
        conversations: pg.clone(),
        channels: pg.clone(),
        messages: pg,
    };

    let cache_store = RedisCacheStore::connect(&config.redis_url).await?;
    if !cache_store.is_available() {
        tracing::warn!(redis_url = %config.redis_url, "redis unreachable at startup; caching disabled until it recovers");
    }

    let hub = FanoutHub::new();
    let bridge = RedisFanoutBridge::start(&config.redis_url, config.realtime_channel.clone(), hub.clone())?;
    let fanout: Arc<dyn FanoutChannel> = Arc::new(bridge);

    Ok(assemble(config, stores, Arc::new(cache_store), hub, fanout, Backend::Persistent))
}

fn assemble(
    config: &AppConfig,
    stores: Stores,
    cache_store: Arc<dyn CacheStore>,
    hub: FanoutHub,
    fanout: Arc<dyn FanoutChannel>,
    backend: Backend,
) -> AppServices {
    let tenants: Arc<dyn TenantContextProvider> = Arc::new(TaskLocalTenant);
    let cache = Arc::new(CacheService::new(
        cache_store,
        Arc::new(CachePolicyTable::from_settings(&config.cache)),
        tenants,
        Arc::new(CacheMetrics::default()),
    ));

    let engine = ActivationRuleEngine::new(stores.conversations, stores.channels, stores.messages, cache.clone(), fanout)
        .with_pause_policy(PausePolicy::from_minutes(config.pause_window_minutes));

    tracing::info!(?backend, "services ready");
    AppServices {
        engine: Arc::new(engine),
        cache,
        hub,
        backend,
    }
}
