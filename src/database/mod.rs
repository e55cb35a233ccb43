use anyhow::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

pub mod memory;
pub mod models;
pub mod postgres;
pub mod repositories;
pub mod store;
pub mod transaction;
pub mod types;
pub mod utils;

pub use memory::{MemoryDirectory, MemoryStore};
pub use postgres::{PgStore, PgUserDirectory};
pub use store::{Store, StoreTx, UserDirectory};
pub use transaction::DatabaseTransaction;

pub async fn init_database(config: &Config) -> Result<PgPool> {
    log::info!(
        "Connecting to database (max connections: {})",
        config.database_max_connections
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    log::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("Migrations completed successfully");

    Ok(pool)
}
