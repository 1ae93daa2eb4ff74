use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bastion_core::auth::{RevocationEngine, RevocationReason, TokenGuard};
use bastion_core::cache::{CacheWarmEngine, DomainManifest, DomainRegistry, RefreshOutcome};
use bastion_core::config::BastionConfig;
use bastion_core::store::{KvStore, RedisStore};
use tracing::info;

use crate::cli::StoreCommand;
use crate::{Error, Result};

/// Resolve the domain registry. Runs before any store connection so a bad
/// manifest, or one whose prefixes reach into reserved keys, fails fast.
fn registry(
    command: &StoreCommand,
    manifest: Option<&Path>,
    config: &BastionConfig,
) -> Result<DomainRegistry> {
    match manifest {
        Some(path) => {
            let registry = DomainManifest::load_registry(path)?;
            registry.check_reserved(config.cache.reserved())?;
            info!(manifest = %path.display(), domains = ?registry.names(), "loaded cache manifest");
            Ok(registry)
        }
        None if command.needs_domains() => Err(Error::Custom(
            "This command needs cache domains: pass --manifest or set BASTION_MANIFEST".into(),
        )),
        None => Ok(DomainRegistry::empty()),
    }
}

pub async fn execute(
    command: StoreCommand,
    manifest: Option<&Path>,
    config: BastionConfig,
) -> Result<()> {
    let registry = registry(&command, manifest, &config)?;

    let store: Arc<dyn KvStore> =
        Arc::new(RedisStore::connect_with(&config.redis_url, config.redis).await?);
    let revocation = RevocationEngine::new(store.clone(), config.revocation.clone());
    let cache = CacheWarmEngine::new(store, registry, config.cache.clone())?;

    match command {
        StoreCommand::Warmup { domain: Some(name) } => {
            let written = cache.warmup(&name).await?;
            println!("{name}\t{written}");
        }
        StoreCommand::Warmup { domain: None } => {
            let report = cache.warmup_all().await;
            for (name, written) in &report.warmed {
                println!("{name}\t{written}");
            }
            for (name, reason) in &report.failed {
                println!("{name}\tfailed: {reason}");
            }
            if !report.is_clean() {
                return Err(Error::Custom(format!(
                    "{} of {} domains failed to warm",
                    report.failed.len(),
                    cache.registry().len()
                )));
            }
        }
        StoreCommand::Refresh { domain } => match cache.refresh(&domain).await? {
            RefreshOutcome::Refreshed { removed, written } => {
                println!("{domain}\tremoved {removed}\twrote {written}");
            }
            RefreshOutcome::Coalesced => {
                println!("{domain}\talready refreshing");
            }
        },
        StoreCommand::Stats => {
            let stats = cache.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StoreCommand::Get { key } => match cache.get(&key).await {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => return Err(Error::Custom(format!("No cache entry for {key}"))),
        },
        StoreCommand::Evict { prefix } => {
            let removed = cache.del_by_prefix(&prefix).await?;
            println!("{removed}");
        }
        StoreCommand::RevokeUser { user, reason } => {
            let Ok(reason) = reason.parse::<RevocationReason>();
            let version = revocation.invalidate_all(&user, &reason).await?;
            println!("{version}");
        }
        StoreCommand::Check { user, version } => {
            let current = revocation.current_version(&user).await?;
            let verdict = if current.admits(version) {
                "valid"
            } else {
                "revoked"
            };
            println!("{verdict}\tcurrent={current}");
        }
        StoreCommand::Blacklist { token, ttl_secs } => {
            revocation
                .blacklist(&token, ttl_secs.map(Duration::from_secs))
                .await?;
            println!("{token}");
        }
        StoreCommand::Unblacklist { token } => {
            let removed = revocation.unblacklist(&token).await?;
            println!("{removed}");
        }
        StoreCommand::ClearVersion { user } => {
            let removed = revocation.clear_version(&user).await?;
            println!("{removed}");
        }
        StoreCommand::IssueToken { user } => {
            let guard = TokenGuard::new(revocation, config.resolve_jwt_secret());
            let (token, claims) = guard.issue(&user).await?;
            info!(user_id = %claims.sub, version = claims.ver, token_id = %claims.jti, "issued access token");
            println!("{token}");
        }
    }

    Ok(())
}
