//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use assistsync_activation::PausePolicy;

use crate::cache::{CacheDomain, CacheSettings};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres stores + Redis cache/fanout when `true`; in-memory otherwise.
    pub persistent: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub cache: CacheSettings,
    pub pause_window_minutes: i64,
    pub reconciler_interval: Duration,
    pub realtime_channel: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            persistent: false,
            database_url: None,
            redis_url: "redis://localhost:6379".to_string(),
            cache: CacheSettings::default(),
            pause_window_minutes: 15,
            reconciler_interval: Duration::from_secs(60),
            realtime_channel: "assistsync:realtime".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match var("BIND_ADDR") {
            Some(v) => parse(&v, "BIND_ADDR")?,
            None => defaults.bind_addr,
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using the development secret");
            defaults.jwt_secret.clone()
        });

        let persistent = match var("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool(&v, "USE_PERSISTENT_STORES")?,
            None => false,
        };

        let database_url = var("DATABASE_URL");
        if persistent && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let mut cache = CacheSettings::default();
        if let Some(v) = var("CACHE_ENABLED") {
            cache.enabled = parse_bool(&v, "CACHE_ENABLED")?;
        }
        if let Some(list) = var("CACHE_DISABLED_DOMAINS") {
            for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let domain = CacheDomain::parse(name).ok_or_else(|| invalid("CACHE_DISABLED_DOMAINS", name))?;
                cache.disabled_domains.push(domain);
            }
        }
        for domain in CacheDomain::ALL {
            let name = format!("CACHE_TTL_{}", domain.as_str().to_ascii_uppercase());
            if let Some(v) = var(&name) {
                let secs: u64 = parse(&v, &name)?;
                cache.ttl_overrides.push((domain, Duration::from_secs(secs)));
            }
        }

        let pause_window_minutes = match var("AI_PAUSE_WINDOW_MINUTES") {
            Some(v) => {
                let minutes: i64 = parse(&v, "AI_PAUSE_WINDOW_MINUTES")?;
                if !(1..=PausePolicy::MAX_WINDOW_MINUTES).contains(&minutes) {
                    return Err(invalid("AI_PAUSE_WINDOW_MINUTES", &v));
                }
                minutes
            }
            None => defaults.pause_window_minutes,
        };

        let reconciler_interval = match var("AI_RECONCILER_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = parse(&v, "AI_RECONCILER_INTERVAL_SECS")?;
                if secs == 0 {
                    return Err(invalid("AI_RECONCILER_INTERVAL_SECS", &v));
                }
                Duration::from_secs(secs)
            }
            None => defaults.reconciler_interval,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            persistent,
            database_url,
            redis_url: var("REDIS_URL").unwrap_or(defaults.redis_url),
            cache,
            pause_window_minutes,
            reconciler_interval,
            realtime_channel: var("REALTIME_REDIS_CHANNEL").unwrap_or(defaults.realtime_channel),
        })
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(name, value))
}

fn parse_bool(value: &str, name: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}
