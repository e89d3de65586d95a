//! Shared cache and counter store.
//!
//! Validation results and rate-limit counters must be shared by every gateway
//! instance, so production deployments use Redis. The in-memory backend has the
//! same semantics and is used for single-instance deployments and tests.

use crate::config::StoreConfig;
use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::Instant;

const MEMORY_STORE_CAPACITY: u64 = 100_000;
const COUNTER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Value of a counter after an increment, and the time left in its window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterWindow {
    pub count: u64,
    pub ttl: Duration,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increments `key`. The expiry is set only when the increment
    /// creates the key, so the window is fixed from the first increment.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<CounterWindow, StoreError>;
}

pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::Redis { url } => Ok(Arc::new(RedisStore::connect(url).await?)),
    }
}

#[derive(Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

struct Window {
    count: u64,
    expires_at: Instant,
}

struct Counters {
    windows: HashMap<String, Window>,
    next_prune: Instant,
}

/// Process-local store. Counters use tokio's clock so windows can be tested
/// with paused time.
pub struct MemoryStore {
    values: Cache<String, StoredValue>,
    counters: Mutex<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let values = Cache::builder()
            .max_capacity(MEMORY_STORE_CAPACITY)
            .expire_after(PerEntryTtl)
            .build();

        MemoryStore {
            values,
            counters: Mutex::new(Counters {
                windows: HashMap::new(),
                next_prune: Instant::now() + COUNTER_PRUNE_INTERVAL,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).map(|stored| stored.value))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.values.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                ttl,
            },
        );
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<CounterWindow, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock();

        // Expired windows of idle keys are swept now and then so the map does
        // not grow without bound.
        if now >= counters.next_prune {
            counters.windows.retain(|_, window| window.expires_at > now);
            counters.next_prune = now + COUNTER_PRUNE_INTERVAL;
        }

        let window = counters.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + ttl,
        });
        if window.expires_at <= now {
            window.count = 0;
            window.expires_at = now + ttl;
        }
        window.count += 1;

        Ok(CounterWindow {
            count: window.count,
            ttl: window.expires_at.saturating_duration_since(now),
        })
    }
}

// INCR and PEXPIRE run as one script so concurrent gateways cannot observe a
// counter without an expiry.
static INCR_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#,
    )
});

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis store");
        Ok(RedisStore { connection })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.pset_ex(key, value, ttl_millis(ttl)).await?;
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<CounterWindow, StoreError> {
        let mut conn = self.connection.clone();
        let (count, ttl_ms): (u64, i64) = INCR_SCRIPT
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;

        Ok(CounterWindow {
            count,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
