use std::time::Duration;

use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub type DbPool = PgPool;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("sqlx migrate error: {0}")]
    Migrate(#[from] MigrateError),
}

/// The sync job is sequential, so a handful of connections covers the worker
/// and the admin routes together.
pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> Result<DbPool, DbPoolError> {
    Ok(PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)?)
}
