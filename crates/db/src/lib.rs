//! SQLite connectivity for the catalog service.
//!
//! Owns pool construction, the storage error kind surfaced to handlers, and
//! the startup schema bootstrap. Queries themselves live with the module that
//! owns the table.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use catalog_kernel::settings::DatabaseSettings;
use catalog_kernel::SchemaStatement;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

pub use sqlx::{SqliteConnection, SqlitePool};

/// Failure of the backing store: connection, transaction or statement.
///
/// A missing row is never reported through this type.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable")]
    Unavailable(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Build a connection pool from settings.
///
/// In-memory databases live only as long as their connection, so those pools
/// are pinned to one connection that is never reaped.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&settings.url)
        .with_context(|| format!("invalid database url '{}'", settings.url))?
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms));

    pool_options = if is_in_memory(&settings.url) {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        pool_options.max_connections(settings.max_connections)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .context("failed to open database")?;

    tracing::info!(
        target: "catalog-db",
        url = %settings.url,
        max_connections = settings.max_connections,
        "database pool ready"
    );

    Ok(pool)
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Apply module schema statements in one transaction.
pub async fn apply_schema(
    pool: &SqlitePool,
    statements: &[(String, SchemaStatement)],
) -> StorageResult<()> {
    let mut tx = pool.begin().await?;

    for (module, statement) in statements {
        tracing::info!(
            target: "catalog-db",
            module = %module,
            statement = statement.id,
            "applying schema statement"
        );
        sqlx::query(statement.sql).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
