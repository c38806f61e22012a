use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

use crate::storage::postgres::PgStore;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
}

/// Open the pool, bring the schema up to date and wrap it in a store.
pub async fn connect_store(
    database_url: &str,
    max_connections: u32,
) -> Result<PgStore, Box<dyn std::error::Error>> {
    let pool = create_pool(database_url, max_connections).await?;
    tracing::info!("Database connection pool created");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations completed");

    Ok(PgStore::new(pool))
}
