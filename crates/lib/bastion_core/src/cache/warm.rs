//! Cache warm engine.
//!
//! Loads each registered domain from its source of truth into the shared
//! store. Every write gets `base TTL + random(0, jitter_max)`, drawn per key,
//! so entries written together do not expire together.
//!
//! Reads never fail: a store error is logged and reported as a miss, and
//! callers recompute from the source of truth. A failing loader leaves the
//! domain's existing entries in place.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::CacheError;
use super::domain::{CacheDomain, DomainRegistry};
use crate::store::glob::prefix_pattern;
use crate::store::{KvStore, decode_value};

/// Default upper bound of the per-key TTL jitter: 5 minutes.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of a domain's "refreshing" marker: 30 seconds.
pub const DEFAULT_REFRESH_LOCK_TTL: Duration = Duration::from_secs(30);

/// Cache engine settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub jitter_max: Duration,
    /// Lifetime of the marker that coalesces concurrent refreshes. Should
    /// exceed the slowest expected loader.
    pub refresh_lock_ttl: Duration,
    /// Marker key prefix. No domain prefix may overlap it.
    pub lock_prefix: String,
    /// Namespaces owned by other components sharing the store. Domains may
    /// not overlap them and prefix deletes skip keys under them.
    pub reserved_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            jitter_max: DEFAULT_JITTER_MAX,
            refresh_lock_ttl: DEFAULT_REFRESH_LOCK_TTL,
            lock_prefix: "bastion:lock:cache-refresh:".to_string(),
            reserved_prefixes: vec!["bastion:auth:".to_string()],
        }
    }
}

impl CacheConfig {
    /// The lock prefix followed by every reserved prefix.
    pub fn reserved(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.lock_prefix.as_str())
            .chain(self.reserved_prefixes.iter().map(String::as_str))
    }

    fn is_reserved(&self, key: &str) -> bool {
        self.reserved().any(|prefix| key.starts_with(prefix))
    }
}

/// Result of a [`CacheWarmEngine::refresh`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call reloaded the domain.
    Refreshed { removed: u64, written: usize },
    /// Another refresh of the domain was already running.
    Coalesced,
}

/// Per-domain outcome of [`CacheWarmEngine::warmup_all`].
#[derive(Debug, Clone, Default)]
pub struct WarmupReport {
    /// `(domain, keys written)`.
    pub warmed: Vec<(String, usize)>,
    /// `(domain, error message)`.
    pub failed: Vec<(String, String)>,
}

impl WarmupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_keys(&self) -> usize {
        self.warmed.iter().map(|(_, n)| n).sum()
    }
}

/// Live key count of one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub keys: usize,
}

/// Warms, refreshes and serves cache domains from the shared store.
pub struct CacheWarmEngine {
    store: Arc<dyn KvStore>,
    registry: DomainRegistry,
    config: CacheConfig,
}

impl CacheWarmEngine {
    /// Fails when a domain prefix overlaps the lock prefix or a reserved
    /// namespace.
    pub fn new(
        store: Arc<dyn KvStore>,
        registry: DomainRegistry,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        registry.check_reserved(config.reserved())?;
        Ok(Self {
            store,
            registry,
            config,
        })
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn domain(&self, name: &str) -> Result<&CacheDomain, CacheError> {
        self.registry
            .get(name)
            .ok_or_else(|| CacheError::UnknownDomain(name.to_string()))
    }

    /// `base` plus a fresh random jitter in `[0, jitter_max]`.
    pub fn jittered_ttl(&self, base: Duration) -> Duration {
        let max_ms = u64::try_from(self.config.jitter_max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return base;
        }
        base.saturating_add(Duration::from_millis(rand::rng().random_range(0..=max_ms)))
    }

    // -----------------------------------------------------------------------
    // Warmup / refresh
    // -----------------------------------------------------------------------

    /// Warm every registered domain. Failures are logged and reported, never
    /// propagated.
    pub async fn warmup_all(&self) -> WarmupReport {
        let mut report = WarmupReport::default();
        for domain in self.registry.iter() {
            match self.warmup(domain.name()).await {
                Ok(written) => report.warmed.push((domain.name().to_string(), written)),
                Err(e) => {
                    error!(domain = domain.name(), error = %e, "cache warmup failed");
                    report.failed.push((domain.name().to_string(), e.to_string()));
                }
            }
        }
        info!(
            store = self.store.name(),
            domains = report.warmed.len(),
            failed = report.failed.len(),
            keys = report.total_keys(),
            "cache warmup finished"
        );
        report
    }

    /// Load one domain and write its entries. Returns the number of keys
    /// written.
    pub async fn warmup(&self, name: &str) -> Result<usize, CacheError> {
        let domain = self.domain(name)?;
        let entries = self.load(domain).await?;
        self.write_entries(domain, &entries).await
    }

    /// Clear a domain and reload it.
    ///
    /// The loader runs before anything is deleted, so a failing loader keeps
    /// the previous entries. Between the delete and the rewrite readers see
    /// misses. Overlapping calls for the same domain, from any process,
    /// coalesce into one loader run through a marker key.
    pub async fn refresh(&self, name: &str) -> Result<RefreshOutcome, CacheError> {
        let domain = self.domain(name)?;
        let marker = format!("{}{}", self.config.lock_prefix, domain.name());
        let owner = Uuid::new_v4().to_string();

        if !self
            .store
            .set_nx(&marker, &owner, self.config.refresh_lock_ttl)
            .await?
        {
            debug!(domain = domain.name(), "refresh already in progress; coalescing");
            return Ok(RefreshOutcome::Coalesced);
        }

        let result = self.refresh_marked(domain).await;
        self.release_marker(&marker, &owner).await;
        result
    }

    async fn refresh_marked(&self, domain: &CacheDomain) -> Result<RefreshOutcome, CacheError> {
        let entries = self.load(domain).await?;
        let mut removed = 0;
        for prefix in domain.prefixes() {
            removed += self.del_matching(&prefix_pattern(prefix)).await?;
        }
        let written = self.write_entries(domain, &entries).await?;
        info!(domain = domain.name(), removed, written, "refreshed cache domain");
        Ok(RefreshOutcome::Refreshed { removed, written })
    }

    /// Drop the marker if it is still ours.
    async fn release_marker(&self, marker: &str, owner: &str) {
        match self.store.get(marker).await {
            Ok(Some(current)) if current == owner => {
                if let Err(e) = self.store.del(&[marker.to_string()]).await {
                    warn!(marker, error = %e, "failed to release refresh marker");
                }
            }
            Ok(_) => debug!(marker, "refresh marker expired before release"),
            Err(e) => warn!(marker, error = %e, "failed to read refresh marker"),
        }
    }

    async fn load(&self, domain: &CacheDomain) -> Result<Vec<(String, Value)>, CacheError> {
        domain.load_entries().await.map_err(|source| {
            error!(
                domain = domain.name(),
                error = %source,
                "cache loader failed; keeping existing entries"
            );
            CacheError::Loader {
                domain: domain.name().to_string(),
                source,
            }
        })
    }

    async fn write_entries(
        &self,
        domain: &CacheDomain,
        entries: &[(String, Value)],
    ) -> Result<usize, CacheError> {
        for (key, value) in entries {
            let raw = serde_json::to_string(value)?;
            let ttl = self.jittered_ttl(domain.base_ttl());
            self.store.set(key, &raw, Some(ttl)).await?;
        }
        debug!(domain = domain.name(), keys = entries.len(), "wrote cache entries");
        Ok(entries.len())
    }

    /// Warm all domains in the background, e.g. from a startup hook.
    pub fn spawn_warmup(self: &Arc<Self>) -> tokio::task::JoinHandle<WarmupReport> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.warmup_all().await })
    }

    // -----------------------------------------------------------------------
    // Point operations
    // -----------------------------------------------------------------------

    /// Read an entry. Store failures are reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(raw) => raw.map(decode_value),
            Err(e) => {
                warn!(key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Read and deserialize an entry. A value of the wrong shape is a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key, error = %e, "cached value has unexpected shape; treating as miss");
                None
            }
        }
    }

    /// Write an entry with `ttl` plus jitter.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw, Some(self.jittered_ttl(ttl))).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.del(&[key.to_string()]).await? > 0)
    }

    /// Delete every key starting with `prefix` (taken literally).
    pub async fn del_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.del_matching(&prefix_pattern(prefix)).await
    }

    /// Delete every key matching a glob pattern. Keys under the lock prefix
    /// or a reserved namespace are never deleted.
    pub async fn del_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let (skipped, keys): (Vec<String>, Vec<String>) = self
            .store
            .keys(pattern)
            .await?
            .into_iter()
            .partition(|key| self.config.is_reserved(key));
        if !skipped.is_empty() {
            warn!(pattern, skipped = skipped.len(), "refusing to delete reserved keys");
        }
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.store.del(&keys).await?)
    }

    /// Live key count per registered domain.
    pub async fn stats(&self) -> Result<Vec<DomainStats>, CacheError> {
        let mut stats = Vec::with_capacity(self.registry.len());
        for domain in self.registry.iter() {
            let mut keys = 0;
            for prefix in domain.prefixes() {
                keys += self.store.keys(&prefix_pattern(prefix)).await?.len();
            }
            stats.push(DomainStats {
                domain: domain.name().to_string(),
                keys,
            });
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::cache::domain::CacheDomain;
    use crate::cache::loader::{DomainLoader, LoaderError, StaticLoader};
    use crate::store::{ManualClock, MemoryStore, StoreError};

    /// Loader whose rows and health can be changed between calls.
    #[derive(Default)]
    struct SwappableLoader {
        rows: Mutex<Vec<Value>>,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl SwappableLoader {
        fn with_rows(rows: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(rows),
                ..Default::default()
            })
        }

        fn replace(&self, rows: Vec<Value>) {
            *self.rows.lock().unwrap() = rows;
        }
    }

    #[async_trait]
    impl DomainLoader for SwappableLoader {
        async fn load(&self) -> Result<Vec<Value>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(LoaderError::Source("database is down".into()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn config_rows() -> Vec<Value> {
        vec![
            json!({"key": "site.name", "value": "Admin"}),
            json!({"key": "upload.max_mb", "value": 20}),
            json!({"key": "login.captcha", "value": true}),
        ]
    }

    fn config_domain(loader: Arc<SwappableLoader>) -> CacheDomain {
        CacheDomain::builder("config", "config:")
            .shared_loader(loader)
            .key_field("key")
            .value_field("value")
            .ttl(Duration::from_secs(600))
            .build()
            .unwrap()
    }

    fn dict_domain() -> CacheDomain {
        CacheDomain::builder("dict", "dict:")
            .loader(StaticLoader::new(vec![
                json!({"type": "sex", "label": "M", "value": "0"}),
                json!({"type": "sex", "label": "F", "value": "1"}),
            ]))
            .group_by_field("type")
            .build()
            .unwrap()
    }

    fn engine_with(
        domains: Vec<CacheDomain>,
        config: CacheConfig,
    ) -> (Arc<CacheWarmEngine>, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let registry = DomainRegistry::new(domains).unwrap();
        let engine = Arc::new(CacheWarmEngine::new(store.clone(), registry, config).unwrap());
        (engine, store, clock)
    }

    #[tokio::test]
    async fn warmup_writes_each_row_under_its_key() {
        let loader = SwappableLoader::with_rows(config_rows());
        let (engine, _, _) = engine_with(vec![config_domain(loader)], CacheConfig::default());

        assert_eq!(engine.warmup("config").await.unwrap(), 3);

        assert_eq!(engine.get("config:site.name").await, Some(json!("Admin")));
        assert_eq!(engine.get("config:upload.max_mb").await, Some(json!(20)));
        assert_eq!(engine.get_as::<bool>("config:login.captcha").await, Some(true));
    }

    #[tokio::test]
    async fn grouped_warmup_then_prefix_delete() {
        let (engine, _, _) = engine_with(vec![dict_domain()], CacheConfig::default());

        engine.warmup("dict").await.unwrap();
        let sex = engine.get("dict:sex").await.unwrap();
        assert_eq!(sex.as_array().map(Vec::len), Some(2));

        assert_eq!(engine.del_by_prefix("dict:").await.unwrap(), 1);
        assert!(engine.get("dict:sex").await.is_none());
    }

    #[tokio::test]
    async fn warmup_ttls_are_jittered_within_bounds() {
        let loader = SwappableLoader::with_rows(
            (0..50)
                .map(|i| json!({"key": format!("k{i}"), "value": i}))
                .collect(),
        );
        let config = CacheConfig {
            jitter_max: Duration::from_secs(60),
            ..CacheConfig::default()
        };
        let (engine, store, _) = engine_with(vec![config_domain(loader)], config);

        engine.warmup("config").await.unwrap();

        let base = Duration::from_secs(600);
        let mut distinct = std::collections::BTreeSet::new();
        for key in store.keys("config:*").await.unwrap() {
            let ttl = store.pttl(&key).await.unwrap().unwrap();
            assert!(ttl >= base && ttl <= base + Duration::from_secs(60), "{key}: {ttl:?}");
            distinct.insert(ttl);
        }
        assert!(distinct.len() > 1, "jitter should spread expiries");
    }

    #[tokio::test]
    async fn zero_jitter_uses_base_ttl() {
        let config = CacheConfig {
            jitter_max: Duration::ZERO,
            ..CacheConfig::default()
        };
        let (engine, store, _) = engine_with(vec![], config);
        engine.set("k", &"v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.pttl("k").await.unwrap(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn unknown_domain_is_an_error() {
        let (engine, _, _) = engine_with(vec![], CacheConfig::default());
        assert!(matches!(
            engine.warmup("tenant").await,
            Err(CacheError::UnknownDomain(_))
        ));
        assert!(matches!(
            engine.refresh("tenant").await,
            Err(CacheError::UnknownDomain(_))
        ));
    }

    #[tokio::test]
    async fn refresh_drops_stale_keys() {
        let loader = SwappableLoader::with_rows(config_rows());
        let (engine, _, _) =
            engine_with(vec![config_domain(loader.clone())], CacheConfig::default());
        engine.warmup("config").await.unwrap();

        loader.replace(vec![json!({"key": "site.name", "value": "Back Office"})]);
        let outcome = engine.refresh("config").await.unwrap();

        assert_eq!(
            outcome,
            RefreshOutcome::Refreshed {
                removed: 3,
                written: 1
            }
        );
        assert_eq!(engine.get("config:site.name").await, Some(json!("Back Office")));
        assert!(engine.get("config:upload.max_mb").await.is_none());
        assert!(engine.get("config:login.captcha").await.is_none());
    }

    #[tokio::test]
    async fn refresh_clears_extra_prefixes() {
        let loader = SwappableLoader::with_rows(config_rows());
        let domain = CacheDomain::builder("config", "config:")
            .extra_prefix("config_page:")
            .shared_loader(loader)
            .key_field("key")
            .build()
            .unwrap();
        let (engine, _, _) = engine_with(vec![domain], CacheConfig::default());
        engine
            .set("config_page:1", &json!([1, 2]), Duration::from_secs(60))
            .await
            .unwrap();

        engine.refresh("config").await.unwrap();

        assert!(engine.get("config_page:1").await.is_none());
    }

    #[tokio::test]
    async fn loader_failure_keeps_previous_entries() {
        let loader = SwappableLoader::with_rows(config_rows());
        let (engine, _, _) =
            engine_with(vec![config_domain(loader.clone())], CacheConfig::default());
        engine.warmup("config").await.unwrap();

        loader.failing.store(true, Ordering::SeqCst);

        assert!(matches!(
            engine.refresh("config").await,
            Err(CacheError::Loader { .. })
        ));
        assert!(matches!(
            engine.warmup("config").await,
            Err(CacheError::Loader { .. })
        ));
        assert_eq!(engine.get("config:site.name").await, Some(json!("Admin")));

        // The marker is released after a failed refresh.
        loader.failing.store(false, Ordering::SeqCst);
        assert!(matches!(
            engine.refresh("config").await.unwrap(),
            RefreshOutcome::Refreshed { .. }
        ));
    }

    #[tokio::test]
    async fn warmup_all_survives_a_failing_domain() {
        let broken = SwappableLoader::with_rows(vec![]);
        broken.failing.store(true, Ordering::SeqCst);
        let (engine, _, _) = engine_with(
            vec![config_domain(broken), dict_domain()],
            CacheConfig::default(),
        );

        let report = engine.warmup_all().await;

        assert!(!report.is_clean());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "config");
        assert_eq!(report.warmed, vec![("dict".to_string(), 1)]);
        assert!(engine.get("dict:sex").await.is_some());
    }

    #[tokio::test]
    async fn spawn_warmup_runs_in_background() {
        let (engine, _, _) = engine_with(vec![dict_domain()], CacheConfig::default());
        let report = engine.spawn_warmup().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.total_keys(), 1);
    }

    /// Loader that parks until released, to hold a refresh open.
    struct GatedLoader {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DomainLoader for GatedLoader {
        async fn load(&self) -> Result<Vec<Value>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![json!({"key": "a", "value": 1})])
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_coalesce() {
        let loader = Arc::new(GatedLoader {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let domain = CacheDomain::builder("config", "config:")
            .shared_loader(loader.clone())
            .key_field("key")
            .build()
            .unwrap();
        let (engine, _, _) = engine_with(vec![domain], CacheConfig::default());

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh("config").await })
        };
        loader.entered.notified().await;

        let second = engine.refresh("config").await.unwrap();
        assert_eq!(second, RefreshOutcome::Coalesced);

        loader.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, RefreshOutcome::Refreshed { written: 1, .. }));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_marker_expires() {
        let loader = SwappableLoader::with_rows(config_rows());
        let (engine, store, clock) =
            engine_with(vec![config_domain(loader)], CacheConfig::default());
        // A crashed refresher left its marker behind.
        store
            .set_nx(
                "bastion:lock:cache-refresh:config",
                "crashed",
                DEFAULT_REFRESH_LOCK_TTL,
            )
            .await
            .unwrap();
        assert_eq!(
            engine.refresh("config").await.unwrap(),
            RefreshOutcome::Coalesced
        );

        clock.advance(DEFAULT_REFRESH_LOCK_TTL);

        assert!(matches!(
            engine.refresh("config").await.unwrap(),
            RefreshOutcome::Refreshed { .. }
        ));
    }

    #[tokio::test]
    async fn stats_counts_keys_per_domain() {
        let loader = SwappableLoader::with_rows(config_rows());
        let (engine, _, _) = engine_with(
            vec![config_domain(loader), dict_domain()],
            CacheConfig::default(),
        );
        engine.warmup_all().await;

        let stats = engine.stats().await.unwrap();

        assert_eq!(
            stats,
            vec![
                DomainStats {
                    domain: "config".into(),
                    keys: 3
                },
                DomainStats {
                    domain: "dict".into(),
                    keys: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn entries_expire_and_read_as_miss() {
        let (engine, _, clock) = engine_with(vec![dict_domain()], CacheConfig::default());
        engine.warmup("dict").await.unwrap();
        clock.advance(DEFAULT_JITTER_MAX + Duration::from_secs(3600));
        assert!(engine.get("dict:sex").await.is_none());
    }

    #[tokio::test]
    async fn non_json_values_read_as_strings() {
        let (engine, store, _) = engine_with(vec![], CacheConfig::default());
        store.set("legacy", "plain text", None).await.unwrap();
        assert_eq!(engine.get("legacy").await, Some(json!("plain text")));
        assert_eq!(engine.get_as::<u32>("legacy").await, None);
    }

    #[tokio::test]
    async fn domain_over_revocation_namespace_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let revocation = crate::auth::RevocationEngine::new(
            store.clone(),
            crate::auth::RevocationConfig::default(),
        );
        revocation
            .invalidate_all("42", &crate::auth::RevocationReason::PasswordChange)
            .await
            .unwrap();

        let wide = CacheDomain::builder("all", "bastion:")
            .loader(StaticLoader::default())
            .key_field("key")
            .build()
            .unwrap();
        let result = CacheWarmEngine::new(
            store.clone(),
            DomainRegistry::new([wide]).unwrap(),
            CacheConfig::default(),
        );

        assert!(matches!(result, Err(CacheError::InvalidDomain { .. })));
        assert!(!revocation.is_token_valid("42", 0).await.unwrap());
    }

    #[tokio::test]
    async fn prefix_delete_skips_reserved_keys() {
        let (engine, store, _) = engine_with(vec![], CacheConfig::default());
        store
            .set("bastion:auth:token_version:42", "1", None)
            .await
            .unwrap();
        store
            .set_nx("bastion:lock:cache-refresh:config", "me", DEFAULT_REFRESH_LOCK_TTL)
            .await
            .unwrap();
        engine.set("bastion:app:k", &1, Duration::from_secs(60)).await.unwrap();

        assert_eq!(engine.del_by_prefix("b").await.unwrap(), 1);
        assert_eq!(engine.del_matching("*").await.unwrap(), 0);

        assert_eq!(
            store.get("bastion:auth:token_version:42").await.unwrap().as_deref(),
            Some("1")
        );
        assert!(store.get("bastion:lock:cache-refresh:config").await.unwrap().is_some());
        assert!(engine.get("bastion:app:k").await.is_none());
    }

    /// Store that fails every call.
    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        async fn set_nx(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        async fn del(&self, _: &[String]) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        async fn keys(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        async fn incr(&self, _: &str, _: Option<Duration>) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        async fn pttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
            Err(StoreError::Unavailable("timeout".into()))
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn store_outage_reads_as_miss() {
        let engine = CacheWarmEngine::new(
            Arc::new(BrokenStore),
            DomainRegistry::new([dict_domain()]).unwrap(),
            CacheConfig::default(),
        )
        .unwrap();
        assert!(engine.get("dict:sex").await.is_none());
        assert!(matches!(
            engine.warmup("dict").await,
            Err(CacheError::Store(_))
        ));
        assert!(!engine.warmup_all().await.is_clean());
    }
}
