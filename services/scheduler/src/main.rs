use std::sync::Arc;

use anyhow::Result;
use tracing::info;

mod jobs;
mod settings;

use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use marketplace::store::PgStore;

use crate::{jobs::Jobs, settings::Settings};

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing("scheduler");

    info!("Starting scheduler service");

    let settings = Settings::load()?;

    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let jobs = Jobs::new(Arc::new(PgStore::new(pool)));
    let mut scheduler = jobs.start(&settings).await?;

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler service");
    scheduler.shutdown().await?;

    Ok(())
}
