//! Like-count fetch pass.
//!
//! For every published item whose record carries its platform identifiers,
//! periodically ask the platform how many likes the post has collected and
//! store the count. Each fetch is retried with backoff when rate limited;
//! once retries are exhausted the rest of the platform's items are skipped
//! until the next pass rather than hammered.

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::{Config, ResolvedConnection};
use crate::db::{self, Database};
use crate::platforms::{self, PlatformError, PostIdentifiers};
use crate::retry::RetryPolicy;

/// Run a like-count fetch pass across every configured connection.
///
/// Per-connection failures are logged and skipped; one platform outage
/// never blocks the others.
pub async fn run_interactions(client: &reqwest::Client, db: &Database, config: &Config) {
    info!("Starting interactions fetch");

    for conn in config.resolved_connections() {
        if let Err(e) = fetch_connection_likes(client, db, conn).await {
            error!(
                connection = %conn.connection.name,
                "Interactions fetch failed for connection: {e:#}"
            );
        }
    }

    info!("Interactions fetch completed");
}

/// Fetch and store like counts for one connection's published items.
async fn fetch_connection_likes(
    client: &reqwest::Client,
    db: &Database,
    conn: ResolvedConnection<'_>,
) -> Result<()> {
    let platform = conn.target.platform;

    let records = db::completed_records(db.pool(), platform).await?;
    if records.is_empty() {
        info!(%platform, "No published records to fetch interactions for");
        return Ok(());
    }
    info!(%platform, count = records.len(), "Fetching like counts");

    let source = platforms::interaction_source(client, conn.target)
        .await
        .context("Failed to authenticate with platform")?;
    let retry = RetryPolicy::default();

    for record in records {
        let identifiers = PostIdentifiers {
            post_url: record.post_url.clone(),
            version_id: record.version_id.clone(),
            post_id: record.post_id.clone(),
        };

        match retry.run(|| source.like_count(&identifiers)).await {
            Ok(count) => {
                db::upsert_interaction(
                    db.pool(),
                    &record.item_name,
                    platform,
                    i64::try_from(count).unwrap_or(i64::MAX),
                )
                .await?;
                info!(%platform, item = %record.item_name, likes = count, "Stored like count");
            }
            Err(PlatformError::RateLimited) => {
                warn!(%platform, "Still rate limited after retries, skipping remaining items");
                break;
            }
            Err(e) => {
                warn!(%platform, item = %record.item_name, "Failed to fetch like count: {e:#}");
            }
        }
    }

    Ok(())
}
