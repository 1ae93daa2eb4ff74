//! JWT access token generation and verification.
//!
//! Access tokens carry the issuing user's token version (`ver`) and a unique
//! token id (`jti`) so they can be revoked in bulk or individually.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// Expiry leeway applied by verification (`jsonwebtoken` default).
pub const EXPIRY_LEEWAY_SECS: i64 = 60;

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id.
    pub sub: String,
    /// Unique token id, the blacklist key.
    pub jti: String,
    /// Token version at issue time. Tokens minted before versioning carry none
    /// and are read as version 0.
    #[serde(default)]
    pub ver: u64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

impl AccessClaims {
    /// Seconds until the token stops verifying, including the leeway.
    pub fn remaining_secs(&self) -> i64 {
        (self.exp + EXPIRY_LEEWAY_SECS - Utc::now().timestamp()).max(0)
    }
}

/// Generate a signed JWT access token (HS256, 15 min expiry).
pub fn generate_access_token(
    user_id: &str,
    version: u64,
    secret: &[u8],
) -> Result<(String, AccessClaims), AuthError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        ver: version,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;
    Ok((token, claims))
}

/// Verify a JWT access token, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<AccessClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = EXPIRY_LEEWAY_SECS as u64;
    decode::<AccessClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    secret_from_file(&jwt_secret_path())
}

/// Read the secret stored at `path`, or generate one and try to persist it.
/// A secret that cannot be persisted is still returned, but tokens signed
/// with it stop verifying after a restart.
fn secret_from_file(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    match persist_secret(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "generated JWT secret could not be persisted; it will change on restart"
        ),
    }
    secret
}

fn persist_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bastion")
        .join("jwt-secret")
}
