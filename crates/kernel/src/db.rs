//! Database connection pool management.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::Config;

/// Table definitions, applied idempotently on startup.
const SCHEMA: &str = include_str!("../migrations/0001_blueprint.sql");

/// Create a SQLite connection pool.
pub async fn create_pool(config: &Config) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = if config.is_in_memory() {
        // Keep the single connection alive; dropping it discards the database.
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect_with(options)
            .await
    }
    .context("failed to connect to SQLite")?;

    Ok(pool)
}

/// Create the kernel tables if they do not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // raw_sql: the schema file holds multiple statements.
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply blueprint schema")?;

    info!("blueprint schema applied");
    Ok(())
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
