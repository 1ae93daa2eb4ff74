//! Reference-data cache: domain registry, warm engine, and call-site
//! combinators.

pub mod combinators;
pub mod domain;
pub mod loader;
pub mod manifest;
pub mod warm;

use thiserror::Error;

use crate::store::StoreError;

pub use combinators::{KeyTemplate, with_cache, with_cache_evict};
pub use domain::{CacheDomain, CacheDomainBuilder, DomainRegistry};
pub use loader::{DomainLoader, JsonFileLoader, LoaderError, StaticLoader};
pub use manifest::{DomainManifest, ManifestError};
pub use warm::{CacheConfig, CacheWarmEngine, DomainStats, RefreshOutcome, WarmupReport};

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unknown cache domain: {0}")]
    UnknownDomain(String),

    #[error("Duplicate cache domain: {0}")]
    DuplicateDomain(String),

    #[error("Invalid cache domain {domain}: {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Loader for domain {domain} failed: {source}")]
    Loader {
        domain: String,
        #[source]
        source: LoaderError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
