use std::collections::HashSet;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{Interaction, NewPublishRecord, Platform, PublishRecord};

// ========== Publish records ==========

/// Get every item name already published on a platform.
pub async fn published_names(pool: &SqlitePool, platform: Platform) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT item_name FROM publish_records WHERE platform = ?")
            .bind(platform.as_str())
            .fetch_all(pool)
            .await
            .context("Failed to fetch published names")?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Insert a publish record, returning its ID.
///
/// Concurrent cycles can race on the same (item, platform) pair, so this is
/// a transactional upsert: a conflicting row keeps its existing non-null
/// identifier fields and only gains values it was missing.
pub async fn insert_publish_record(pool: &SqlitePool, record: &NewPublishRecord) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO publish_records (platform, item_name, post_url, version_id, post_id)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (item_name, platform) DO UPDATE SET
            post_url = COALESCE(publish_records.post_url, excluded.post_url),
            version_id = COALESCE(publish_records.version_id, excluded.version_id),
            post_id = COALESCE(publish_records.post_id, excluded.post_id)
        ",
    )
    .bind(record.platform.as_str())
    .bind(&record.item_name)
    .bind(&record.post_url)
    .bind(&record.version_id)
    .bind(&record.post_id)
    .execute(pool)
    .await
    .context("Failed to insert publish record")?;

    Ok(result.last_insert_rowid())
}

/// Get one record by its key pair.
pub async fn get_publish_record(
    pool: &SqlitePool,
    item_name: &str,
    platform: Platform,
) -> Result<Option<PublishRecord>> {
    sqlx::query_as("SELECT * FROM publish_records WHERE item_name = ? AND platform = ?")
        .bind(item_name)
        .bind(platform.as_str())
        .fetch_optional(pool)
        .await
        .context("Failed to fetch publish record")
}

/// Get all records on a platform still missing identifier fields that
/// platform requires.
pub async fn find_incomplete(pool: &SqlitePool, platform: Platform) -> Result<Vec<PublishRecord>> {
    let condition = match platform {
        Platform::Bluesky => "post_url IS NULL OR version_id IS NULL",
        Platform::Pixelfed => "post_url IS NULL OR post_id IS NULL",
        Platform::Instagram => "post_id IS NULL",
    };

    let query = format!(
        "SELECT * FROM publish_records WHERE platform = ? AND ({condition}) ORDER BY created_at"
    );

    sqlx::query_as(&query)
        .bind(platform.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to fetch incomplete publish records")
}

/// Get all records on a platform carrying every identifier field that
/// platform requires. Only these can be asked about on the platform again.
pub async fn completed_records(pool: &SqlitePool, platform: Platform) -> Result<Vec<PublishRecord>> {
    let condition = match platform {
        Platform::Bluesky => "post_url IS NOT NULL AND version_id IS NOT NULL",
        Platform::Pixelfed => "post_url IS NOT NULL AND post_id IS NOT NULL",
        Platform::Instagram => "post_id IS NOT NULL",
    };

    let query = format!(
        "SELECT * FROM publish_records WHERE platform = ? AND ({condition}) ORDER BY created_at"
    );

    sqlx::query_as(&query)
        .bind(platform.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to fetch completed publish records")
}

/// Fill in identifier fields discovered by reconciliation.
///
/// Only non-null candidate values are applied; a repeated backfill pass with
/// the same platform history leaves the record unchanged.
pub async fn update_identifiers(
    pool: &SqlitePool,
    item_name: &str,
    platform: Platform,
    post_url: Option<&str>,
    version_id: Option<&str>,
    post_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE publish_records
        SET post_url = COALESCE(?, post_url),
            version_id = COALESCE(?, version_id),
            post_id = COALESCE(?, post_id)
        WHERE item_name = ? AND platform = ?
        ",
    )
    .bind(post_url)
    .bind(version_id)
    .bind(post_id)
    .bind(item_name)
    .bind(platform.as_str())
    .execute(pool)
    .await
    .context("Failed to update publish record identifiers")?;

    Ok(())
}

// ========== Interactions ==========

/// Store a freshly fetched like count, replacing any earlier value.
pub async fn upsert_interaction(
    pool: &SqlitePool,
    item_name: &str,
    platform: Platform,
    like_count: i64,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO interactions (platform, item_name, like_count)
        VALUES (?, ?, ?)
        ON CONFLICT (item_name, platform) DO UPDATE SET
            like_count = excluded.like_count,
            updated_at = datetime('now')
        ",
    )
    .bind(platform.as_str())
    .bind(item_name)
    .bind(like_count)
    .execute(pool)
    .await
    .context("Failed to upsert interaction")?;

    Ok(())
}

/// Get the stored like count for one published item.
pub async fn get_interaction(
    pool: &SqlitePool,
    item_name: &str,
    platform: Platform,
) -> Result<Option<Interaction>> {
    sqlx::query_as("SELECT * FROM interactions WHERE item_name = ? AND platform = ?")
        .bind(item_name)
        .bind(platform.as_str())
        .fetch_optional(pool)
        .await
        .context("Failed to fetch interaction")
}
