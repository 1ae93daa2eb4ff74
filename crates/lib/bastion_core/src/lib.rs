//! # bastion_core
//!
//! Consistency layer over a shared key-value store: instant token revocation
//! (per-user version counters plus a token blacklist) and anti-stampede
//! warming of read-mostly reference data.

pub mod auth;
pub mod cache;
pub mod config;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
