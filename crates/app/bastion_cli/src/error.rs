use bastion_core::auth::{GuardError, RevocationError};
use bastion_core::cache::{CacheError, ManifestError};
use bastion_core::config::ConfigError;
use bastion_core::store::StoreError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("Logging: {}", .0)]
    Logging(String),

    #[error("Config: {}", .0)]
    Config(#[from] ConfigError),

    #[error("Manifest: {}", .0)]
    Manifest(#[from] ManifestError),

    #[error("Store: {}", .0)]
    Store(#[from] StoreError),

    #[error("Revocation: {}", .0)]
    Revocation(#[from] RevocationError),

    #[error("Auth: {}", .0)]
    Guard(#[from] GuardError),

    #[error("Cache: {}", .0)]
    Cache(#[from] CacheError),

    #[error("Json: {}", .0)]
    Json(#[from] serde_json::Error),
}
