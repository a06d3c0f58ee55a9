//! Shared sliding-log stores for rate limiting.
//!
//! The limiter itself holds no lock: the atomicity of a single
//! [`CounterStore::admit`] is the store's contract. The in-memory store
//! gets it from DashMap's shard lock, the redis store from a Lua script.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::config::{RateLimitConfig, StoreKind};

/// Counter store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store timed out after {0} ms")]
    Timeout(u64),

    #[error("counter store error: {0}")]
    Backend(String),
}

/// Result of one admission attempt against a key's sliding log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Admitted requests inside the window, including this one if admitted.
    pub count: u64,
    /// Timestamp (epoch ms) of the oldest admitted request still inside the window.
    pub oldest_ms: Option<u64>,
    pub admitted: bool,
}

/// An atomic, expiring sliding-log store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically drop timestamps of `key` at or before `now_ms - window`,
    /// then record `now_ms` if fewer than `limit` remain.
    ///
    /// Rejected attempts are not recorded. A key lives for `window` after its
    /// latest admission.
    async fn admit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowHit, StoreError>;

    /// Drop expired keys. Stores with native expiry need not override this.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn name(&self) -> &'static str;
}

fn window_ms(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct SlidingLog {
    hits: VecDeque<u64>,
    expires_at: Instant,
}

/// Process-local sliding-log store.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    logs: DashMap<String, SlidingLog>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn admit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u64,
    ) -> Result<WindowHit, StoreError> {
        let cutoff = now_ms.saturating_sub(window_ms(window));
        let mut log = self.logs.entry(key.to_string()).or_insert_with(|| SlidingLog {
            hits: VecDeque::new(),
            expires_at: Instant::now() + window,
        });
        log.hits.retain(|&t| t > cutoff);

        let admitted = (log.hits.len() as u64) < limit;
        if admitted {
            log.hits.push_back(now_ms);
            log.expires_at = Instant::now() + window;
        }
        Ok(WindowHit {
            count: log.hits.len() as u64,
            oldest_ms: log.hits.iter().min().copied(),
            admitted,
        })
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.logs.len();
        self.logs.retain(|_, log| log.expires_at > now);
        Ok(before.saturating_sub(self.logs.len()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(feature = "redis-store")]
pub use self::redis_store::RedisCounterStore;

#[cfg(feature = "redis-store")]
mod redis_store {
    use super::*;
    use redis::aio::ConnectionManager;

    // KEYS[1] = log key; ARGV = now_ms, window_ms, limit, unique member.
    const ADMIT_SCRIPT: &str = r#"
        local now = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])
        redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
        local count = redis.call('ZCARD', KEYS[1])
        local admitted = 0
        if count < tonumber(ARGV[3]) then
            redis.call('ZADD', KEYS[1], now, ARGV[4])
            redis.call('PEXPIRE', KEYS[1], window)
            count = count + 1
            admitted = 1
        end
        local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
        local oldest_ms = -1
        if oldest[2] then
            oldest_ms = tonumber(oldest[2])
        end
        return {count, admitted, oldest_ms}
    "#;

    /// Sliding-log store shared across processes through redis sorted sets.
    #[derive(Clone)]
    pub struct RedisCounterStore {
        conn: ConnectionManager,
        script: redis::Script,
    }

    impl std::fmt::Debug for RedisCounterStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisCounterStore").finish()
        }
    }

    impl RedisCounterStore {
        pub async fn connect(url: &str) -> Result<Self, StoreError> {
            let client =
                redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            tracing::info!("Connected to redis counter store");
            Ok(Self {
                conn,
                script: redis::Script::new(ADMIT_SCRIPT),
            })
        }
    }

    #[async_trait]
    impl CounterStore for RedisCounterStore {
        async fn admit(
            &self,
            key: &str,
            now_ms: u64,
            window: Duration,
            limit: u64,
        ) -> Result<WindowHit, StoreError> {
            let mut conn = self.conn.clone();
            // Members must be unique so that same-millisecond hits all count.
            let member = format!("{now_ms}-{}", uuid::Uuid::new_v4());
            let (count, admitted, oldest): (u64, u8, i64) = self
                .script
                .key(key)
                .arg(now_ms)
                .arg(window_ms(window))
                .arg(limit)
                .arg(member)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(WindowHit {
                count,
                oldest_ms: u64::try_from(oldest).ok(),
                admitted: admitted == 1,
            })
        }

        fn name(&self) -> &'static str {
            "redis"
        }
    }
}

/// Build the store selected by the configuration.
pub async fn build_store(config: &RateLimitConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.store {
        StoreKind::Memory => Ok(Arc::new(InMemoryCounterStore::new())),
        #[cfg(feature = "redis-store")]
        StoreKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("redis_url not set".into()))?;
            Ok(Arc::new(RedisCounterStore::connect(url).await?))
        }
        #[cfg(not(feature = "redis-store"))]
        StoreKind::Redis => Err(StoreError::Unavailable(
            "built without the redis-store feature".into(),
        )),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_admits_up_to_limit_per_key() {
        let store = InMemoryCounterStore::new();
        let now = 1_700_000_000_000;
        for i in 1..=3 {
            let hit = store.admit("a", now, MINUTE, 3).await.unwrap();
            assert!(hit.admitted);
            assert_eq!(hit.count, i);
            assert_eq!(hit.oldest_ms, Some(now));
        }
        let hit = store.admit("a", now + 1, MINUTE, 3).await.unwrap();
        assert!(!hit.admitted);
        assert_eq!(hit.count, 3);
        assert!(store.admit("b", now, MINUTE, 3).await.unwrap().admitted);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_old_hits_slide_out_of_window() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_millis(1_000);
        assert!(store.admit("k", 0, window, 2).await.unwrap().admitted);
        assert!(store.admit("k", 500, window, 2).await.unwrap().admitted);
        assert!(!store.admit("k", 999, window, 2).await.unwrap().admitted);

        // The hit at 0 leaves the window at 1000, the one at 500 stays.
        let hit = store.admit("k", 1_000, window, 2).await.unwrap();
        assert!(hit.admitted);
        assert_eq!(hit.count, 2);
        assert_eq!(hit.oldest_ms, Some(500));
    }

    #[tokio::test]
    async fn test_rejected_hits_are_not_recorded() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_millis(1_000);
        assert!(store.admit("k", 0, window, 1).await.unwrap().admitted);
        for t in [100, 400, 900] {
            assert!(!store.admit("k", t, window, 1).await.unwrap().admitted);
        }
        assert!(store.admit("k", 1_000, window, 1).await.unwrap().admitted);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryCounterStore::new();
        store.admit("short", 0, Duration::from_millis(10), 5).await.unwrap();
        store.admit("long", 0, MINUTE, 5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_is_atomic() {
        let store = Arc::new(InMemoryCounterStore::new());
        let now = 1_700_000_000_000;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut admitted = 0u64;
                for _ in 0..125 {
                    if store.admit("shared", now, MINUTE, 700).await.unwrap().admitted {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap();
        }
        assert_eq!(total, 700);
    }
}
