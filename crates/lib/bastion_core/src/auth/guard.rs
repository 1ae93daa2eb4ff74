//! Authentication guard: JWT verification plus revocation checks.
//!
//! This is the call boundary an HTTP middleware uses on every authenticated
//! request: verify the signature and expiry, reject blacklisted token ids,
//! then reject tokens whose version predates the user's last revocation.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use super::AuthError;
use super::jwt::{self, AccessClaims};
use super::revocation::{RevocationEngine, RevocationError, RevocationReason};

/// What to do when revocation state cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Reject the request.
    #[default]
    FailClosed,
    /// Admit the token unchecked, with a warning. Only applies to store
    /// outages; corrupt state is always rejected.
    FailOpen,
}

/// Guard errors.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token has been revoked")]
    Blacklisted,

    #[error("Token version {presented} has been revoked")]
    StaleVersion { presented: u64 },

    #[error("Revocation state unavailable: {0}")]
    Unavailable(#[source] RevocationError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Issues and checks access tokens against the revocation engine.
#[derive(Clone)]
pub struct TokenGuard {
    revocation: RevocationEngine,
    secret: Vec<u8>,
    policy: FailurePolicy,
}

impl TokenGuard {
    pub fn new(revocation: RevocationEngine, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            revocation,
            secret: secret.into(),
            policy: FailurePolicy::default(),
        }
    }

    /// Set the store-outage policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn revocation(&self) -> &RevocationEngine {
        &self.revocation
    }

    /// Issue an access token carrying the user's current version.
    pub async fn issue(&self, user_id: &str) -> Result<(String, AccessClaims), GuardError> {
        let version = self
            .revocation
            .current_version(user_id)
            .await
            .map_err(GuardError::Unavailable)?;
        Ok(jwt::generate_access_token(
            user_id,
            version.issue_version(),
            &self.secret,
        )?)
    }

    /// Verify a bearer token and run the blacklist and version checks.
    pub async fn authenticate(&self, token: &str) -> Result<AccessClaims, GuardError> {
        let claims =
            jwt::verify_access_token(token, &self.secret).ok_or(GuardError::InvalidToken)?;

        match self.revocation.is_blacklisted(&claims.jti).await {
            Ok(true) => return Err(GuardError::Blacklisted),
            Ok(false) => {}
            Err(e) => self.on_revocation_error(&claims, e)?,
        }

        match self.revocation.is_token_valid(&claims.sub, claims.ver).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(GuardError::StaleVersion {
                    presented: claims.ver,
                });
            }
            Err(e) => self.on_revocation_error(&claims, e)?,
        }

        Ok(claims)
    }

    /// Blacklist the token for as long as it would otherwise verify.
    pub async fn logout(&self, token: &str) -> Result<(), GuardError> {
        let claims =
            jwt::verify_access_token(token, &self.secret).ok_or(GuardError::InvalidToken)?;
        let ttl = Duration::from_secs(claims.remaining_secs().max(1).unsigned_abs());
        self.revocation
            .blacklist(&claims.jti, Some(ttl))
            .await
            .map_err(GuardError::Unavailable)
    }

    /// Revoke every outstanding token for a user after a password change.
    pub async fn password_changed(&self, user_id: &str) -> Result<u64, GuardError> {
        self.revocation
            .invalidate_all(user_id, &RevocationReason::PasswordChange)
            .await
            .map_err(GuardError::Unavailable)
    }

    fn on_revocation_error(
        &self,
        claims: &AccessClaims,
        err: RevocationError,
    ) -> Result<(), GuardError> {
        if self.policy == FailurePolicy::FailOpen && err.is_unavailable() {
            warn!(
                user_id = %claims.sub,
                token_id = %claims.jti,
                error = %err,
                "revocation state unavailable; admitting token unchecked"
            );
            return Ok(());
        }
        warn!(
            user_id = %claims.sub,
            token_id = %claims.jti,
            error = %err,
            "revocation check failed; rejecting token"
        );
        Err(GuardError::Unavailable(err))
    }
}
