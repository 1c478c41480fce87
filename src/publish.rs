//! The publish cycle: pick the next feed entry for a connection and post it.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::caption::{build_caption, MAX_POST_LEN};
use crate::config::ResolvedConnection;
use crate::db::{self, Database, NewPublishRecord};
use crate::feed::{self, extract_alt_text};
use crate::platforms::{self, MediaSource, PlatformError, PostIdentifiers};
use crate::selector::select_candidate;

/// Alt text used when the feed entry does not carry any.
const ALT_FALLBACK: &str = "Alt not found";

/// Run one publish cycle for a connection.
///
/// Returns the published item's name, or `None` when no entry was eligible
/// (which is a normal no-op, not an error).
///
/// Unlike history fetching, this pathway is not retried on rate limits:
/// any platform failure fails the run and the next scheduled cycle tries
/// again.
///
/// # Errors
///
/// Returns an error if the feed is unreachable, the store fails, or the
/// platform rejects the upload or post.
pub async fn publish_next(
    client: &reqwest::Client,
    db: &Database,
    conn: ResolvedConnection<'_>,
) -> Result<Option<String>> {
    let platform = conn.target.platform;

    let entries = feed::fetch_entries(client, &conn.source.feed_url)
        .await
        .context("Failed to load source feed")?;
    let published = db::published_names(db.pool(), platform).await?;

    let Some(entry) =
        select_candidate(&entries, &published, Utc::now(), &mut rand::thread_rng())
    else {
        info!(
            connection = %conn.connection.name,
            "No entries available after filtering"
        );
        return Ok(None);
    };
    let entry = entry.clone();

    let image_url = entry
        .image_url
        .as_deref()
        .context("Selected entry has no image")?;
    let image = download_image(client, image_url).await?;

    let alt_text = entry
        .description
        .as_deref()
        .and_then(extract_alt_text)
        .unwrap_or_else(|| ALT_FALLBACK.to_string());
    let caption = build_caption(&conn.connection.caption, &entry.categories, MAX_POST_LEN);

    let adapter = platforms::publish_adapter(client, conn.target)
        .await
        .context("Failed to authenticate with platform")?;

    let media = adapter
        .upload_media(MediaSource {
            bytes: &image,
            source_url: image_url,
            alt_text: &alt_text,
        })
        .await
        .context("Failed to upload media")?;

    // A post that went through but whose response we could not decode is
    // still a publication; record it without identifiers and let backfill
    // reconcile them later.
    let identifiers = match adapter.create_post(&caption, &media).await {
        Ok(identifiers) => identifiers,
        Err(PlatformError::Malformed(msg)) => {
            warn!(
                item = %entry.title,
                "Post created but identifiers not captured: {msg}"
            );
            PostIdentifiers::default()
        }
        Err(e) => return Err(e).context("Failed to create post"),
    };

    db::insert_publish_record(
        db.pool(),
        &NewPublishRecord {
            platform,
            item_name: entry.title.clone(),
            post_url: identifiers.post_url,
            version_id: identifiers.version_id,
            post_id: identifiers.post_id,
        },
    )
    .await?;

    info!(
        connection = %conn.connection.name,
        item = %entry.title,
        %platform,
        "Entry published"
    );

    Ok(Some(entry.title))
}

async fn download_image(client: &reqwest::Client, image_url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(image_url)
        .send()
        .await
        .context("Failed to download image")?;

    if !response.status().is_success() {
        anyhow::bail!("image download failed with status {}", response.status());
    }

    Ok(response
        .bytes()
        .await
        .context("Failed to read image body")?
        .to_vec())
}
