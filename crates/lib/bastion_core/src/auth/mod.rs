//! Token revocation and the authentication-boundary helpers built on it.
//!
//! `revocation` owns the per-user version counters and the token blacklist.
//! `jwt` issues and verifies access tokens that carry a version claim, and
//! `guard` combines the two into the checks an authentication layer runs on
//! every request.

pub mod guard;
pub mod jwt;
pub mod revocation;

use thiserror::Error;

pub use guard::{FailurePolicy, GuardError, TokenGuard};
pub use revocation::{
    RevocationConfig, RevocationEngine, RevocationError, RevocationReason, TokenVersion,
};

/// Token encoding errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
