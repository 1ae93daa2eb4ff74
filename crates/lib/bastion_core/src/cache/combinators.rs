//! Read-through and evict-after-write helpers for call sites.
//!
//! ```ignore
//! let page = KeyTemplate::new("config_page:{page}").render(&[("page", "1")]);
//! let rows = with_cache(&engine, &page, ttl, || repo.list_page(1)).await?;
//!
//! with_cache_evict(&engine, "config_page:*", || repo.update(row)).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::warm::CacheWarmEngine;

/// Cache key with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    template: String,
}

impl KeyTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else { break };
            names.push(&after[..close]);
            rest = &after[close + 1..];
        }
        names
    }

    /// Substitute placeholders. Names without a binding are left as written.
    pub fn render(&self, args: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };
            let name = &after[..close];
            match args.iter().find(|(n, _)| *n == name) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&rest[open..open + close + 2]),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Return the cached value under `key`, or compute, store and return it.
///
/// A miss (including an unreadable store) runs `compute`; a failed write is
/// logged and the computed value is still returned. Errors from `compute`
/// propagate and nothing is cached.
pub async fn with_cache<T, E, F, Fut>(
    engine: &CacheWarmEngine,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(hit) = engine.get_as::<T>(key).await {
        debug!(key, "cache hit");
        return Ok(hit);
    }
    let value = compute().await?;
    if let Err(e) = engine.set(key, &value, ttl).await {
        warn!(key, error = %e, "failed to populate cache entry");
    }
    Ok(value)
}

/// Run a write, then delete every key matching `pattern`.
///
/// Keys are only evicted when `op` succeeds. An eviction failure is logged
/// and does not fail the write.
pub async fn with_cache_evict<T, E, F, Fut>(
    engine: &CacheWarmEngine,
    pattern: &str,
    op: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let out = op().await?;
    match engine.del_matching(pattern).await {
        Ok(removed) => debug!(pattern, removed, "evicted cache entries"),
        Err(e) => warn!(pattern, error = %e, "cache eviction failed"),
    }
    Ok(out)
}
