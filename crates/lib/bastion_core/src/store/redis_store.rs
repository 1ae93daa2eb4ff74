//! Redis-backed store.
//!
//! Uses a multiplexed `ConnectionManager` that reconnects on its own; the
//! handle is cheap to clone per call.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::{info, warn};

use super::{KvStore, MIN_TTL, StoreError};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 500;

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
        {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.max(MIN_TTL).as_millis()).unwrap_or(u64::MAX)
}

/// Strip credentials from a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

/// Connection limits. The initial connect, including retries, never takes
/// longer than `connection_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisConfig {
    pub connection_timeout: Duration,
    pub response_timeout: Duration,
    /// Reconnect attempts after a dropped connection.
    pub number_of_retries: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            number_of_retries: 2,
        }
    }
}

/// Store backed by a Redis server (or any RESP-compatible server).
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`) with default limits.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with(url, RedisConfig::default()).await
    }

    pub async fn connect_with(url: &str, config: RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout)
            .set_number_of_retries(config.number_of_retries);
        let connect = ConnectionManager::new_with_config(client, manager_config);
        let manager = match tokio::time::timeout(config.connection_timeout, connect).await {
            Ok(manager) => manager?,
            Err(_) => {
                warn!(url = %redact(url), timeout = ?config.connection_timeout, "redis connect timed out");
                return Err(StoreError::Unavailable(format!(
                    "connect to {} timed out after {:?}",
                    redact(url),
                    config.connection_timeout
                )));
            }
        };
        info!(url = %redact(url), "connected to redis");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn)
                    .await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once across iterations.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let ms = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
                // MULTI/EXEC: the increment and the expiry land together.
                let (value,): (i64,) = redis::pipe()
                    .atomic()
                    .incr(key, 1)
                    .pexpire(key, ms)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(value)
            }
            None => {
                let value: i64 = conn.incr(key, 1).await?;
                Ok(value)
            }
        }
    }

    async fn pttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn();
        let ms: i64 = conn.pttl(key).await?;
        // -2: no such key, -1: no expiry.
        Ok(u64::try_from(ms).ok().map(Duration::from_millis))
    }

    fn name(&self) -> &str {
        "redis"
    }
}
