//! Cache domain descriptors and the process-wide domain registry.
//!
//! A domain is a named group of cache entries sharing a key prefix and a
//! loader. Descriptors are built once at startup and only read afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::CacheError;
use super::loader::{DomainLoader, LoaderError};

/// Default base TTL for a domain: 1 hour.
pub const DEFAULT_DOMAIN_TTL: Duration = Duration::from_secs(60 * 60);

/// Derives a key suffix (or group key) from a source row.
pub type KeyFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Derives the cached value from a source row.
pub type ValueFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Render a scalar field of a row as a key component.
pub fn field_key(row: &Value, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Descriptor of one cache domain.
#[derive(Clone)]
pub struct CacheDomain {
    name: String,
    prefixes: Vec<String>,
    loader: Arc<dyn DomainLoader>,
    key_of: Option<KeyFn>,
    value_of: ValueFn,
    group_by: Option<KeyFn>,
    base_ttl: Duration,
}

impl CacheDomain {
    /// Start describing a domain whose entries live under `prefix`.
    pub fn builder(name: impl Into<String>, prefix: impl Into<String>) -> CacheDomainBuilder {
        CacheDomainBuilder {
            name: name.into(),
            prefixes: vec![prefix.into()],
            loader: None,
            key_of: None,
            value_of: None,
            group_by: None,
            base_ttl: DEFAULT_DOMAIN_TTL,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All prefixes owned by the domain; the first is where warmup writes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn primary_prefix(&self) -> &str {
        &self.prefixes[0]
    }

    pub fn base_ttl(&self) -> Duration {
        self.base_ttl
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.is_some()
    }

    /// Run the loader and map its rows to cache entries.
    pub async fn load_entries(&self) -> Result<Vec<(String, Value)>, LoaderError> {
        let rows = self.loader.load().await?;
        Ok(self.map_rows(&rows))
    }

    /// Map source rows to `(key, value)` pairs.
    ///
    /// Grouped domains produce one list-valued entry per group key, in row
    /// order within each group. Rows without a key are skipped.
    pub fn map_rows(&self, rows: &[Value]) -> Vec<(String, Value)> {
        let prefix = self.primary_prefix();
        let entries: Vec<(String, Value)> = match (&self.group_by, &self.key_of) {
            (Some(group_of), _) => {
                let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                for row in rows {
                    if let Some(group) = group_of(row) {
                        groups.entry(group).or_default().push((self.value_of)(row));
                    }
                }
                groups
                    .into_iter()
                    .map(|(group, values)| (format!("{prefix}{group}"), Value::Array(values)))
                    .collect()
            }
            (None, Some(key_of)) => rows
                .iter()
                .filter_map(|row| {
                    let key = key_of(row)?;
                    Some((format!("{prefix}{key}"), (self.value_of)(row)))
                })
                .collect(),
            (None, None) => Vec::new(),
        };
        if entries.is_empty() && !rows.is_empty() {
            debug!(domain = %self.name, rows = rows.len(), "no row produced a cache key");
        }
        entries
    }
}

impl fmt::Debug for CacheDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheDomain")
            .field("name", &self.name)
            .field("prefixes", &self.prefixes)
            .field("grouped", &self.is_grouped())
            .field("base_ttl", &self.base_ttl)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CacheDomain`].
pub struct CacheDomainBuilder {
    name: String,
    prefixes: Vec<String>,
    loader: Option<Arc<dyn DomainLoader>>,
    key_of: Option<KeyFn>,
    value_of: Option<ValueFn>,
    group_by: Option<KeyFn>,
    base_ttl: Duration,
}

impl CacheDomainBuilder {
    pub fn loader(mut self, loader: impl DomainLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn shared_loader(mut self, loader: Arc<dyn DomainLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Additional prefix cleared by refresh and counted by stats.
    pub fn extra_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn key_of(mut self, f: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> Self {
        self.key_of = Some(Arc::new(f));
        self
    }

    /// Key each row by one of its scalar fields.
    pub fn key_field(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.key_of(move |row| field_key(row, &field))
    }

    pub fn value_of(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.value_of = Some(Arc::new(f));
        self
    }

    /// Cache one field of each row instead of the whole row.
    pub fn value_field(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.value_of(move |row| row.get(&field).cloned().unwrap_or(Value::Null))
    }

    /// Group rows and cache one list per group instead of one entry per row.
    pub fn group_by(mut self, f: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> Self {
        self.group_by = Some(Arc::new(f));
        self
    }

    pub fn group_by_field(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.group_by(move |row| field_key(row, &field))
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.base_ttl = ttl;
        self
    }

    pub fn build(self) -> Result<CacheDomain, CacheError> {
        let invalid = |reason: &str| CacheError::InvalidDomain {
            domain: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.prefixes.iter().any(String::is_empty) {
            return Err(invalid("prefixes must not be empty"));
        }
        if self.key_of.is_none() && self.group_by.is_none() {
            return Err(invalid("a key function or a group-by function is required"));
        }
        if self.base_ttl.is_zero() {
            return Err(invalid("base TTL must be positive"));
        }
        let loader = self.loader.clone().ok_or_else(|| invalid("a loader is required"))?;
        let value_of: ValueFn = match self.value_of {
            Some(f) => f,
            None => Arc::new(|row: &Value| row.clone()),
        };
        Ok(CacheDomain {
            name: self.name,
            prefixes: self.prefixes,
            loader,
            key_of: self.key_of,
            value_of,
            group_by: self.group_by,
            base_ttl: self.base_ttl,
        })
    }
}

/// Registered domains, populated at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct DomainRegistry {
    domains: Arc<Vec<CacheDomain>>,
}

impl DomainRegistry {
    /// Registry with no domains.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `domains`, rejecting duplicate names and overlapping prefixes
    /// (refreshing one domain must never clear another's keys).
    pub fn new(domains: impl IntoIterator<Item = CacheDomain>) -> Result<Self, CacheError> {
        let domains: Vec<CacheDomain> = domains.into_iter().collect();
        for (i, domain) in domains.iter().enumerate() {
            for other in &domains[i + 1..] {
                if other.name == domain.name {
                    return Err(CacheError::DuplicateDomain(domain.name.clone()));
                }
                let overlapping = domain
                    .prefixes
                    .iter()
                    .find(|a| other.prefixes.iter().any(|b| prefixes_overlap(a, b)));
                if let Some(prefix) = overlapping {
                    return Err(CacheError::InvalidDomain {
                        domain: other.name.clone(),
                        reason: format!("prefix overlaps {:?} of domain {}", prefix, domain.name),
                    });
                }
            }
        }
        Ok(Self {
            domains: Arc::new(domains),
        })
    }

    /// Reject any domain whose prefixes overlap a namespace owned by
    /// something else in the store, such as revocation records.
    pub fn check_reserved<'a>(
        &self,
        reserved: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CacheError> {
        for namespace in reserved {
            for domain in self.domains.iter() {
                if let Some(prefix) = domain
                    .prefixes
                    .iter()
                    .find(|p| prefixes_overlap(p, namespace))
                {
                    return Err(CacheError::InvalidDomain {
                        domain: domain.name.clone(),
                        reason: format!("prefix {prefix:?} overlaps reserved namespace {namespace:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CacheDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Domains in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheDomain> {
        self.domains.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// True when a key could fall under both prefixes.
pub(crate) fn prefixes_overlap(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

impl fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.domains.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::loader::StaticLoader;

    fn dict_rows() -> Vec<Value> {
        vec![
            json!({"type": "sex", "label": "M", "value": "0"}),
            json!({"type": "sex", "label": "F", "value": "1"}),
            json!({"type": "status", "label": "Active", "value": "A"}),
        ]
    }

    #[test]
    fn keyed_domain_maps_one_entry_per_row() {
        let domain = CacheDomain::builder("config", "config:")
            .loader(StaticLoader::default())
            .key_field("key")
            .value_field("value")
            .build()
            .unwrap();
        let entries = domain.map_rows(&[
            json!({"key": "site.name", "value": "Admin"}),
            json!({"key": 7, "value": 3}),
            json!({"value": "orphan"}),
        ]);
        assert_eq!(
            entries,
            vec![
                ("config:site.name".to_string(), json!("Admin")),
                ("config:7".to_string(), json!(3)),
            ]
        );
    }

    #[test]
    fn grouped_domain_maps_one_list_per_group() {
        let domain = CacheDomain::builder("dict", "dict:")
            .loader(StaticLoader::default())
            .group_by_field("type")
            .build()
            .unwrap();
        let entries = domain.map_rows(&dict_rows());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "dict:sex");
        assert_eq!(entries[0].1.as_array().unwrap().len(), 2);
        assert_eq!(entries[0].1[0]["label"], "M");
        assert_eq!(entries[1].0, "dict:status");
    }

    #[test]
    fn build_requires_loader_and_key() {
        let no_loader = CacheDomain::builder("a", "a:").key_field("id").build();
        assert!(matches!(no_loader, Err(CacheError::InvalidDomain { .. })));

        let no_key = CacheDomain::builder("a", "a:")
            .loader(StaticLoader::default())
            .build();
        assert!(matches!(no_key, Err(CacheError::InvalidDomain { .. })));

        let empty_prefix = CacheDomain::builder("a", "")
            .loader(StaticLoader::default())
            .key_field("id")
            .build();
        assert!(matches!(empty_prefix, Err(CacheError::InvalidDomain { .. })));
    }

    fn domain(name: &str, prefix: &str) -> CacheDomain {
        CacheDomain::builder(name, prefix)
            .loader(StaticLoader::default())
            .key_field("id")
            .build()
            .unwrap()
    }

    #[test]
    fn registry_rejects_duplicates() {
        let err = DomainRegistry::new([domain("dict", "dict:"), domain("dict", "d2:")]).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateDomain(name) if name == "dict"));
    }

    #[test]
    fn registry_rejects_overlapping_prefixes() {
        let err =
            DomainRegistry::new([domain("dict", "dict:"), domain("dict_sex", "dict:sex")]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidDomain { .. }));
    }

    #[test]
    fn registry_rejects_prefixes_covering_reserved_namespaces() {
        let reserved = ["bastion:auth:", "bastion:lock:cache-refresh:"];

        let wide = DomainRegistry::new([domain("all", "bastion:")]).unwrap();
        let err = wide.check_reserved(reserved).unwrap_err();
        assert!(matches!(err, CacheError::InvalidDomain { domain, .. } if domain == "all"));

        let narrow = DomainRegistry::new([domain("tokens", "bastion:auth:token_version:")]).unwrap();
        assert!(narrow.check_reserved(reserved).is_err());

        let sibling = DomainRegistry::new([domain("app", "bastion:app:")]).unwrap();
        assert!(sibling.check_reserved(reserved).is_ok());
    }

    #[test]
    fn registry_keeps_registration_order() {
        let registry = DomainRegistry::new([domain("dict", "dict:"), domain("config", "config:")])
            .unwrap();
        assert_eq!(registry.names(), vec!["dict", "config"]);
        assert!(registry.get("config").is_some());
        assert!(registry.get("tenant").is_none());
    }
}
