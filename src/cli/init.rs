//! Database initialization command

use learnlens_core::{error::Result, AppConfig};
use std::path::PathBuf;
use tracing::debug;

/// Handle database initialization command
pub async fn handle(config: AppConfig, config_out: Option<PathBuf>) -> Result<()> {
    debug!("Initializing database...");

    // Opening creates the file and runs migrations
    let _storage = super::open_storage(&config).await?;
    println!(" Database initialized: {}", config.database.url);

    if let Some(path) = config_out {
        config.to_file(&path)?;
        println!(" Configuration written: {}", path.display());
    }

    Ok(())
}
