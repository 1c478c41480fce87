//! Backfill reconciliation.
//!
//! Publish records can be missing their platform identifiers: the post
//! went through but the response was not captured, or the post predates
//! this system. This pass walks each connection's platform history,
//! matches post images against feed images by perceptual hash, and fills
//! in the missing fields. Matching is the only way to reconnect a post to
//! its feed item, since the platforms do not echo the item name back.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::{Config, ResolvedConnection};
use crate::db::{self, Database};
use crate::feed;
use crate::fingerprint::{self, Fingerprinted, ImageFingerprint, MATCH_THRESHOLD};
use crate::platforms;

/// A feed image fingerprinted for matching.
struct FeedImage {
    item_name: String,
    fingerprint: ImageFingerprint,
}

impl Fingerprinted for FeedImage {
    fn fingerprint(&self) -> &ImageFingerprint {
        &self.fingerprint
    }
}

/// Run a backfill pass across every configured connection.
///
/// A connection whose fetch or match phase fails entirely is logged and
/// skipped; one platform outage never blocks the others.
pub async fn run_backfill(client: &reqwest::Client, db: &Database, config: &Config) {
    info!("Starting backfill process");

    for conn in config.resolved_connections() {
        info!(
            connection = %conn.connection.name,
            platform = %conn.target.platform,
            "Processing connection"
        );
        if let Err(e) = backfill_connection(client, db, conn).await {
            error!(
                connection = %conn.connection.name,
                "Backfill failed for connection: {e:#}"
            );
        }
    }

    info!("Backfill process completed");
}

/// Reconcile one connection's incomplete records.
async fn backfill_connection(
    client: &reqwest::Client,
    db: &Database,
    conn: ResolvedConnection<'_>,
) -> Result<()> {
    let platform = conn.target.platform;

    let incomplete = db::find_incomplete(db.pool(), platform).await?;
    if incomplete.is_empty() {
        info!(%platform, "No records need backfill");
        return Ok(());
    }
    info!(%platform, count = incomplete.len(), "Found records needing backfill");

    // Only fingerprint the feed images that can actually resolve a record.
    let wanted: HashSet<&str> = incomplete.iter().map(|r| r.item_name.as_str()).collect();
    let feed_images = load_feed_images(client, &conn.source.feed_url, &wanted).await?;
    if feed_images.is_empty() {
        info!(%platform, "No matching feed images found for records needing backfill");
        return Ok(());
    }

    // One login per run, then the full history in one sweep.
    let source = platforms::history_source(client, conn.target)
        .await
        .context("Failed to authenticate with platform")?;
    let posts = source
        .fetch_history()
        .await
        .context("Failed to fetch platform history")?;
    info!(%platform, count = posts.len(), "Fetched platform history");

    for post in posts {
        let Some(image_url) = post.image_url.as_deref() else {
            continue;
        };

        let hash = match fingerprint::fingerprint_from_url(client, image_url).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(post = ?post.id.as_deref().or(post.url.as_deref()), "Could not hash platform image: {e:#}");
                continue;
            }
        };

        // Unmatched posts are expected; the account may hold unrelated
        // content.
        let Some(matched) = fingerprint::best_match(&hash, &feed_images, MATCH_THRESHOLD) else {
            continue;
        };

        info!(
            %platform,
            item = %matched.item_name,
            post = ?post.url.as_deref().or(post.id.as_deref()),
            "Matched platform post to feed item"
        );

        if let Err(e) = db::update_identifiers(
            db.pool(),
            &matched.item_name,
            platform,
            post.url.as_deref(),
            post.version.as_deref(),
            post.id.as_deref(),
        )
        .await
        {
            error!(item = %matched.item_name, "Failed to update record: {e:#}");
        }
    }

    Ok(())
}

/// Fingerprint the feed images whose item names are in `wanted`.
///
/// Images that cannot be downloaded or decoded are skipped with a warning;
/// their records stay incomplete until a later pass.
async fn load_feed_images(
    client: &reqwest::Client,
    feed_url: &str,
    wanted: &HashSet<&str>,
) -> Result<Vec<FeedImage>> {
    let entries = feed::fetch_entries(client, feed_url)
        .await
        .context("Failed to load source feed")?;

    let mut images = Vec::new();
    for entry in entries {
        if !wanted.contains(entry.title.as_str()) {
            continue;
        }
        let Some(image_url) = entry.image_url.as_deref() else {
            continue;
        };

        match fingerprint::fingerprint_from_url(client, image_url).await {
            Ok(hash) => images.push(FeedImage {
                item_name: entry.title,
                fingerprint: hash,
            }),
            Err(e) => {
                warn!(item = %entry.title, "Could not hash feed image: {e:#}");
            }
        }
    }

    Ok(images)
}
