//! YAML manifest declaring file-backed cache domains.
//!
//! ```yaml
//! domains:
//!   - name: dict
//!     prefix: "dict:"
//!     source: dict.json
//!     group_by: type
//!   - name: config
//!     prefix: "config:"
//!     extra_prefixes: ["config_page:"]
//!     source: config.json
//!     key_field: key
//!     value_field: value
//!     ttl_secs: 600
//! ```
//!
//! Relative `source` paths resolve against the manifest's directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::CacheError;
use super::domain::{CacheDomain, DomainRegistry};
use super::loader::JsonFileLoader;

/// Manifest errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Domain(#[from] CacheError),
}

/// Parsed manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainManifest {
    pub domains: Vec<DomainSpec>,
}

/// One domain entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainSpec {
    pub name: String,
    pub prefix: String,
    #[serde(default)]
    pub extra_prefixes: Vec<String>,
    /// JSON file holding an array of rows.
    pub source: PathBuf,
    pub key_field: Option<String>,
    pub value_field: Option<String>,
    pub group_by: Option<String>,
    pub ttl_secs: Option<u64>,
}

impl DomainManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Load a manifest and build its registry in one step.
    pub fn load_registry(path: &Path) -> Result<DomainRegistry, ManifestError> {
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::load(path)?.into_registry(base_dir)
    }

    /// Build and validate the registry.
    pub fn into_registry(self, base_dir: &Path) -> Result<DomainRegistry, ManifestError> {
        let domains = self
            .domains
            .into_iter()
            .map(|domain| domain.into_domain(base_dir))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DomainRegistry::new(domains)?)
    }
}

impl DomainSpec {
    fn into_domain(self, base_dir: &Path) -> Result<CacheDomain, CacheError> {
        let source = if self.source.is_absolute() {
            self.source
        } else {
            base_dir.join(self.source)
        };
        let mut builder =
            CacheDomain::builder(self.name, self.prefix).loader(JsonFileLoader::new(source));
        for prefix in self.extra_prefixes {
            builder = builder.extra_prefix(prefix);
        }
        if let Some(field) = self.key_field {
            builder = builder.key_field(field);
        }
        if let Some(field) = self.value_field {
            builder = builder.value_field(field);
        }
        if let Some(field) = self.group_by {
            builder = builder.group_by_field(field);
        }
        if let Some(secs) = self.ttl_secs {
            builder = builder.ttl(Duration::from_secs(secs));
        }
        builder.build()
    }
}
