use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::info;

use crate::error::Result;

pub type DbPool = Pool<Postgres>;

/// Establish a Postgres connection pool.
///
/// The reference lookup pool is sized to the number of expansion workers so
/// that every worker holds its own connection; the destination pool only
/// ever needs one.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!(max_connections, "Database connection pool established");
    Ok(pool)
}

/// Run database migrations embedded at compile-time.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
