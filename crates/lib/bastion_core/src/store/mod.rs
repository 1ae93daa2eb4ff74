//! Key-value store contract shared by the revocation and cache engines.
//!
//! The contract is deliberately narrow: string values, per-key expiry,
//! glob enumeration, and two atomic primitives (`incr`, `set_nx`). No
//! multi-key transactions are assumed.

pub mod glob;
pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::{Clock, ManualClock, MemoryStore, SystemClock};
pub use redis_store::{RedisConfig, RedisStore};

/// Smallest expiry the stores accept; shorter TTLs are rounded up to it.
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Malformed value at {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl StoreError {
    /// True for connection, IO and timeout failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Shared networked key-value store with per-key expiry.
///
/// Implementations must be safe to share across tasks; the same store is
/// typically shared by every process of a deployment.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value. `None` TTL means the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write a value only if the key is absent. Returns whether it was written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete keys, returning how many live entries were removed.
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Enumerate live keys matching a glob pattern (`*`, `?`, `[...]`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically increment an integer value (absent counts as 0) and return
    /// the new value. When `ttl` is given the expiry is reset to it.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError>;

    /// Remaining lifetime. `None` when the key is absent or never expires.
    async fn pttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Store identifier for logging.
    fn name(&self) -> &str;
}

/// Decode a stored value: JSON when it parses, otherwise the raw string.
pub fn decode_value(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}
