use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operate the token revocation store and the reference-data cache.
#[derive(Parser, Debug)]
#[command(name = "bastion", version, about)]
pub struct Cli {
    /// Redis connection URL. Overrides `REDIS_URL` from the environment.
    #[arg(long, global = true)]
    pub redis_url: Option<String>,

    /// YAML manifest describing cache domains.
    #[arg(long, global = true, env = "BASTION_MANIFEST")]
    pub manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the version.
    Version,

    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that talk to the store.
#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Load cache domains from their sources into the store.
    Warmup {
        /// Only warm this domain.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Clear a cache domain and reload it.
    Refresh { domain: String },

    /// Show the live key count of each cache domain.
    Stats,

    /// Print a cached value as JSON.
    Get { key: String },

    /// Delete every cache key starting with a prefix.
    Evict { prefix: String },

    /// Revoke every token issued so far for a user.
    RevokeUser {
        user: String,
        /// Reason recorded in the log, e.g. `password_change`.
        #[arg(long, default_value = "admin_forced")]
        reason: String,
    },

    /// Check whether a token version is still accepted for a user.
    Check { user: String, version: u64 },

    /// Blacklist a single token id.
    Blacklist {
        token: String,
        /// Lifetime of the entry; defaults to `TOKEN_BLACKLIST_TTL_SECS`.
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Remove a token id from the blacklist.
    Unblacklist { token: String },

    /// Drop a user's version record.
    ClearVersion { user: String },

    /// Issue an access token carrying the user's current version.
    IssueToken { user: String },
}

impl StoreCommand {
    /// Whether the command operates on manifest domains.
    pub fn needs_domains(&self) -> bool {
        matches!(
            self,
            StoreCommand::Warmup { .. } | StoreCommand::Refresh { .. } | StoreCommand::Stats
        )
    }
}
