//! Runtime configuration.

use std::time::Duration;

use thiserror::Error;

use crate::auth::jwt::resolve_jwt_secret;
use crate::auth::revocation::{DEFAULT_BLACKLIST_TTL, DEFAULT_VERSION_TTL, RevocationConfig};
use crate::cache::warm::{CacheConfig, DEFAULT_JITTER_MAX, DEFAULT_REFRESH_LOCK_TTL};
use crate::store::RedisConfig;

/// Default store URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default namespace for every key the crate writes outside cache domains.
pub const DEFAULT_KEY_PREFIX: &str = "bastion";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Configuration for the revocation and cache engines.
#[derive(Clone, Debug)]
pub struct BastionConfig {
    /// Redis connection URL.
    pub redis_url: String,
    pub redis: RedisConfig,
    pub revocation: RevocationConfig,
    pub cache: CacheConfig,
    /// JWT signing secret from the environment, if set.
    pub jwt_secret: Option<String>,
}

impl Default for BastionConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.into(),
            redis: RedisConfig::default(),
            revocation: RevocationConfig::default(),
            cache: CacheConfig::default(),
            jwt_secret: None,
        }
    }
}

impl BastionConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                      | Default                               |
    /// |-------------------------------|---------------------------------------|
    /// | `REDIS_URL`                   | `redis://127.0.0.1:6379`              |
    /// | `REDIS_CONNECT_TIMEOUT_SECS`  | `5`                                   |
    /// | `REDIS_RESPONSE_TIMEOUT_SECS` | `5`                                   |
    /// | `BASTION_KEY_PREFIX`          | `bastion`                             |
    /// | `TOKEN_VERSION_TTL_SECS`      | `604800` (7 days)                     |
    /// | `TOKEN_BLACKLIST_TTL_SECS`    | `86400` (24 hours)                    |
    /// | `CACHE_JITTER_MAX_SECS`       | `300`                                 |
    /// | `CACHE_REFRESH_LOCK_TTL_SECS` | `30`                                  |
    /// | `JWT_SECRET` / `AUTH_SECRET`  | generated & persisted to file         |
    ///
    /// Revocation keys live under `{prefix}:auth:` and refresh markers under
    /// `{prefix}:lock:cache-refresh:`. Cache domains may not overlap either.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let redis_url = var("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.into());
        let key_prefix = var("BASTION_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.into());
        let key_prefix = key_prefix.trim_end_matches(':').to_string();
        if key_prefix.is_empty() {
            return Err(ConfigError::Empty {
                var: "BASTION_KEY_PREFIX",
            });
        }

        let seconds = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match var(name) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidSeconds {
                        var: name,
                        value: raw,
                    }),
            }
        };

        let defaults = RedisConfig::default();
        let redis = RedisConfig {
            connection_timeout: seconds("REDIS_CONNECT_TIMEOUT_SECS", defaults.connection_timeout)?,
            response_timeout: seconds("REDIS_RESPONSE_TIMEOUT_SECS", defaults.response_timeout)?,
            ..defaults
        };
        let revocation = RevocationConfig {
            key_prefix: format!("{key_prefix}:auth"),
            version_ttl: seconds("TOKEN_VERSION_TTL_SECS", DEFAULT_VERSION_TTL)?,
            blacklist_ttl: seconds("TOKEN_BLACKLIST_TTL_SECS", DEFAULT_BLACKLIST_TTL)?,
        };
        let cache = CacheConfig {
            jitter_max: seconds("CACHE_JITTER_MAX_SECS", DEFAULT_JITTER_MAX)?,
            refresh_lock_ttl: seconds("CACHE_REFRESH_LOCK_TTL_SECS", DEFAULT_REFRESH_LOCK_TTL)?,
            lock_prefix: format!("{key_prefix}:lock:cache-refresh:"),
            reserved_prefixes: vec![format!("{}:", revocation.key_prefix)],
        };
        let jwt_secret = var("JWT_SECRET").or_else(|| var("AUTH_SECRET"));

        Ok(Self {
            redis_url,
            redis,
            revocation,
            cache,
            jwt_secret,
        })
    }

    /// The configured JWT secret, or the generated one persisted on disk.
    pub fn resolve_jwt_secret(&self) -> String {
        self.jwt_secret.clone().unwrap_or_else(resolve_jwt_secret)
    }
}
