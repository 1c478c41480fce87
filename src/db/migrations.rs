use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await
        .context("Failed to clear schema version")?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .context("Failed to set schema version")?;

    Ok(())
}

/// Initial schema: the publish record ledger.
///
/// The unique index on (item_name, platform) is what lets concurrent
/// publish cycles race safely on the same item.
async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE publish_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            platform TEXT NOT NULL,
            item_name TEXT NOT NULL,
            post_url TEXT,
            version_id TEXT,
            post_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (item_name, platform)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create publish_records table")?;

    sqlx::query("CREATE INDEX idx_publish_records_platform ON publish_records (platform)")
        .execute(pool)
        .await
        .context("Failed to create platform index")?;

    Ok(())
}

/// Interaction counts fetched back from the platforms, one row per
/// published (item, platform) pair, overwritten on every fetch pass.
async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            platform TEXT NOT NULL,
            item_name TEXT NOT NULL,
            like_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (item_name, platform)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create interactions table")?;

    Ok(())
}
