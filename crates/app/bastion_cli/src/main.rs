//! `bastion` operator CLI.

// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use bastion_core::config::BastionConfig;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::error;

mod cli;
mod commands;
mod logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    let command = match args.command {
        Commands::Version => {
            println!("bastion {}", bastion_core::version());
            return Ok(());
        }
        Commands::Store(command) => command,
    };

    let mut config = BastionConfig::from_env()?;
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }

    commands::execute(command, args.manifest.as_deref(), config).await
}
