use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

pub type DbPool = Pool<Postgres>;

/// Open a Postgres pool sized for the loader's write concurrency.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .with_context(|| "failed to connect to Postgres")
}

/// Run database migrations embedded at compile-time.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .with_context(|| "failed to run database migrations")
}

/// Resolve the connection string from `DATABASE_URL` or `HERDBOOK_DATABASE_URL`.
pub fn database_url_from_env() -> Result<String> {
    std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("HERDBOOK_DATABASE_URL"))
        .context("DATABASE_URL (or HERDBOOK_DATABASE_URL) must be set")
}
