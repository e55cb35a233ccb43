use std::sync::Arc;

use anyhow::Result;

use roster::database::{PgStore, PgUserDirectory, init_database};
use roster::services::LogNotifier;
use roster::{AdmissionEngine, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init();

    log::info!("Starting roster maintenance run...");

    let config = Config::from_env()?;
    log::info!(
        "Configuration loaded (environment: {})",
        config.environment
    );

    let pool = init_database(&config).await?;
    log::info!("Database initialized");

    let engine = AdmissionEngine::new(
        config,
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgUserDirectory::new(pool)),
        Arc::new(LogNotifier),
    );

    let expired = engine.expire_stale_invites().await?;
    log::info!("Maintenance finished, {} invites expired", expired);

    Ok(())
}
