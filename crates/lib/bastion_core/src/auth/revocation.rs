//! Token revocation engine.
//!
//! Two independent mechanisms share one store:
//!
//! - **Token versions**: a per-user counter. A presented token is valid iff
//!   its embedded version is at least the stored one. Bumping the counter
//!   revokes every token issued before the bump in one write.
//! - **Blacklist**: one entry per revoked token id, rejected regardless of
//!   its version. Entries expire on their own once the token would have.
//!
//! A user with no version record is unrestricted: every token is valid.
//! Tokens issued before versioning was switched on keep working until the
//! first revocation event for their user. This is a compatibility rule and
//! is kept distinct from "version 0" via [`TokenVersion::NoRestriction`].
//!
//! Store failures are always returned to the caller. The engine never decides
//! on its own whether an unverifiable token is valid.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{KvStore, StoreError};

/// Default lifetime of a version record: 7 days.
pub const DEFAULT_VERSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default lifetime of a blacklist entry: 24 hours.
pub const DEFAULT_BLACKLIST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Revocation errors.
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Corrupt token version for user {user_id}: {raw:?}")]
    CorruptVersion { user_id: String, raw: String },
}

impl RevocationError {
    /// True when the store could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RevocationError::Store(e) if e.is_unavailable())
    }
}

/// Stored version state for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVersion {
    /// No record: every token is accepted.
    NoRestriction,
    /// Tokens must carry at least this version.
    Version(u64),
}

impl TokenVersion {
    /// Whether a token carrying `presented` passes the version check.
    pub fn admits(self, presented: u64) -> bool {
        match self {
            TokenVersion::NoRestriction => true,
            TokenVersion::Version(required) => presented >= required,
        }
    }

    /// Version to embed in a newly issued token.
    pub fn issue_version(self) -> u64 {
        match self {
            TokenVersion::NoRestriction => 0,
            TokenVersion::Version(v) => v,
        }
    }
}

impl fmt::Display for TokenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenVersion::NoRestriction => f.write_str("unrestricted"),
            TokenVersion::Version(v) => write!(f, "{v}"),
        }
    }
}

/// Why a user's tokens were revoked. Only used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationReason {
    PasswordChange,
    RoleChange,
    AccountDisabled,
    AdminForced,
    Logout,
    Other(String),
}

impl RevocationReason {
    pub fn as_str(&self) -> &str {
        match self {
            RevocationReason::PasswordChange => "password_change",
            RevocationReason::RoleChange => "role_change",
            RevocationReason::AccountDisabled => "account_disabled",
            RevocationReason::AdminForced => "admin_forced",
            RevocationReason::Logout => "logout",
            RevocationReason::Other(reason) => reason.as_str(),
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "password_change" => RevocationReason::PasswordChange,
            "role_change" => RevocationReason::RoleChange,
            "account_disabled" => RevocationReason::AccountDisabled,
            "admin_forced" => RevocationReason::AdminForced,
            "logout" => RevocationReason::Logout,
            other => RevocationReason::Other(other.to_string()),
        })
    }
}

/// Key layout and lifetimes.
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Namespace for revocation keys, e.g. `bastion:auth`.
    pub key_prefix: String,
    pub version_ttl: Duration,
    /// Should be at least the longest remaining lifetime of an issued token.
    pub blacklist_ttl: Duration,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            key_prefix: "bastion:auth".to_string(),
            version_ttl: DEFAULT_VERSION_TTL,
            blacklist_ttl: DEFAULT_BLACKLIST_TTL,
        }
    }
}

/// Per-user token versions plus the token blacklist.
#[derive(Clone)]
pub struct RevocationEngine {
    store: Arc<dyn KvStore>,
    config: RevocationConfig,
}

impl RevocationEngine {
    pub fn new(store: Arc<dyn KvStore>, config: RevocationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RevocationConfig {
        &self.config
    }

    fn version_key(&self, user_id: &str) -> String {
        format!("{}:token_version:{user_id}", self.config.key_prefix)
    }

    fn blacklist_key(&self, token_id: &str) -> String {
        format!("{}:token_blacklist:{token_id}", self.config.key_prefix)
    }

    // -----------------------------------------------------------------------
    // Token versions
    // -----------------------------------------------------------------------

    /// Read the stored version state for a user.
    pub async fn current_version(&self, user_id: &str) -> Result<TokenVersion, RevocationError> {
        let Some(raw) = self.store.get(&self.version_key(user_id)).await? else {
            return Ok(TokenVersion::NoRestriction);
        };
        raw.trim()
            .parse::<u64>()
            .map(TokenVersion::Version)
            .map_err(|_| RevocationError::CorruptVersion {
                user_id: user_id.to_string(),
                raw,
            })
    }

    /// Whether a token carrying `token_version` passes the version check.
    pub async fn is_token_valid(
        &self,
        user_id: &str,
        token_version: u64,
    ) -> Result<bool, RevocationError> {
        Ok(self.current_version(user_id).await?.admits(token_version))
    }

    /// Revoke every token issued so far for `user_id`.
    ///
    /// The stored version goes up by exactly one (from 0 when absent) and its
    /// lifetime is reset. Tokens must be reissued with the returned version.
    pub async fn invalidate_all(
        &self,
        user_id: &str,
        reason: &RevocationReason,
    ) -> Result<u64, RevocationError> {
        let raw = self
            .store
            .incr(&self.version_key(user_id), Some(self.config.version_ttl))
            .await?;
        let version = u64::try_from(raw).map_err(|_| RevocationError::CorruptVersion {
            user_id: user_id.to_string(),
            raw: raw.to_string(),
        })?;
        info!(
            user_id,
            version,
            reason = %reason,
            store = self.store.name(),
            "revoked all tokens for user"
        );
        Ok(version)
    }

    /// [`invalidate_all`](Self::invalidate_all) for each user independently.
    ///
    /// Results are in input order. A failure for one user does not stop the
    /// others; an id listed twice is bumped twice.
    pub async fn invalidate_many<S: AsRef<str>>(
        &self,
        user_ids: &[S],
        reason: &RevocationReason,
    ) -> Vec<Result<u64, RevocationError>> {
        join_all(
            user_ids
                .iter()
                .map(|user_id| self.invalidate_all(user_id.as_ref(), reason)),
        )
        .await
    }

    /// Remove a user's version record, returning them to the unrestricted
    /// state. Meant for tests and administrative resets.
    pub async fn clear_version(&self, user_id: &str) -> Result<bool, RevocationError> {
        let removed = self.store.del(&[self.version_key(user_id)]).await?;
        debug!(user_id, removed, "cleared token version");
        Ok(removed > 0)
    }

    // -----------------------------------------------------------------------
    // Blacklist
    // -----------------------------------------------------------------------

    /// Blacklist a single token id. `None` uses the configured default TTL.
    pub async fn blacklist(
        &self,
        token_id: &str,
        ttl: Option<Duration>,
    ) -> Result<(), RevocationError> {
        let ttl = ttl.unwrap_or(self.config.blacklist_ttl);
        let revoked_at = Utc::now().timestamp_millis().to_string();
        self.store
            .set(&self.blacklist_key(token_id), &revoked_at, Some(ttl))
            .await?;
        debug!(token_id, ttl_secs = ttl.as_secs(), "blacklisted token");
        Ok(())
    }

    pub async fn is_blacklisted(&self, token_id: &str) -> Result<bool, RevocationError> {
        Ok(self.store.get(&self.blacklist_key(token_id)).await?.is_some())
    }

    /// When the token was blacklisted, if it is.
    pub async fn blacklisted_at(
        &self,
        token_id: &str,
    ) -> Result<Option<DateTime<Utc>>, RevocationError> {
        let key = self.blacklist_key(token_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| {
                RevocationError::Store(StoreError::Malformed {
                    key,
                    reason: format!("expected a millisecond timestamp, got {raw:?}"),
                })
            })
    }

    /// Remove a blacklist entry early. Entries normally just expire.
    pub async fn unblacklist(&self, token_id: &str) -> Result<bool, RevocationError> {
        let removed = self.store.del(&[self.blacklist_key(token_id)]).await?;
        Ok(removed > 0)
    }
}
