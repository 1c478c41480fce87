//! Platform adapters: publishing and history enumeration.
//!
//! Each platform module normalizes its own JSON shapes at the boundary so
//! the selector, publish cycle and backfill only ever see [`PlatformPost`]
//! and [`PostIdentifiers`].

pub mod bluesky;
pub mod instagram;
pub mod pixelfed;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Target;
use crate::db::Platform;
use crate::retry::Retryable;

/// Failure classification for platform API calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Upstream asked us to slow down (HTTP 429).
    #[error("rate limited")]
    RateLimited,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    /// The platform failed before a post came into existence. Unlike
    /// [`Malformed`](Self::Malformed), the item must not be recorded as
    /// published.
    #[error("post not created: {0}")]
    NotCreated(String),
    /// A call that did (or may) have taken effect returned a response we
    /// could not decode.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Retryable for PlatformError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Map an HTTP response to the error taxonomy, passing successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(PlatformError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlatformError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

pub(crate) fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// A post that already exists on a platform, normalized for matching.
///
/// Fetchers fill exactly the identifier fields their platform's records
/// require; reconciliation copies them over verbatim.
#[derive(Debug, Clone)]
pub struct PlatformPost {
    pub id: Option<String>,
    pub url: Option<String>,
    pub version: Option<String>,
    pub image_url: Option<String>,
}

/// Identifiers captured from a freshly created post.
#[derive(Debug, Clone, Default)]
pub struct PostIdentifiers {
    pub post_url: Option<String>,
    pub version_id: Option<String>,
    pub post_id: Option<String>,
}

/// The image a post is built around.
///
/// Carries both the downloaded bytes and the original URL because the
/// platforms disagree about which they want: bluesky and pixelfed take an
/// upload, instagram fetches the URL itself.
#[derive(Debug, Clone, Copy)]
pub struct MediaSource<'a> {
    pub bytes: &'a [u8],
    pub source_url: &'a str,
    pub alt_text: &'a str,
}

/// Opaque platform-specific media reference produced by an upload.
#[derive(Debug, Clone)]
pub struct MediaRef(pub String);

/// Upload-then-post capability of a platform.
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Stage the image on the platform, returning a reference for the post.
    async fn upload_media(&self, media: MediaSource<'_>) -> Result<MediaRef, PlatformError>;

    /// Create the post carrying the staged media.
    async fn create_post(
        &self,
        caption: &str,
        media: &MediaRef,
    ) -> Result<PostIdentifiers, PlatformError>;
}

/// Paginated enumeration of an account's existing posts.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch the account's full post history, newest first.
    ///
    /// Implementations page until their idiom's terminal condition and
    /// retry rate-limited pages with backoff.
    async fn fetch_history(&self) -> Result<Vec<PlatformPost>, PlatformError>;
}

/// Like-count lookup for posts this service created earlier.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// Current like count of the post addressed by `identifiers`.
    ///
    /// Each platform reads the identifier fields its records carry;
    /// callers should only pass records that are complete for the
    /// platform.
    async fn like_count(&self, identifiers: &PostIdentifiers) -> Result<u64, PlatformError>;
}

/// Build the publish adapter for a target, performing any login it needs.
///
/// # Errors
///
/// Returns an error if authentication fails; the caller treats that as
/// fatal for the connection.
pub async fn publish_adapter(
    client: &reqwest::Client,
    target: &Target,
) -> Result<Box<dyn PublishAdapter>, PlatformError> {
    match target.platform {
        Platform::Bluesky => Ok(Box::new(
            bluesky::BlueskyClient::connect(client.clone(), target).await?,
        )),
        Platform::Pixelfed => Ok(Box::new(pixelfed::PixelfedClient::new(
            client.clone(),
            target,
        ))),
        Platform::Instagram => Ok(Box::new(instagram::InstagramClient::new(
            client.clone(),
            target,
        ))),
    }
}

/// Build the history source for a target, performing any login it needs.
///
/// Authentication happens once here, not per page.
///
/// # Errors
///
/// Returns an error if authentication fails.
pub async fn history_source(
    client: &reqwest::Client,
    target: &Target,
) -> Result<Box<dyn HistorySource>, PlatformError> {
    match target.platform {
        Platform::Bluesky => Ok(Box::new(
            bluesky::BlueskyClient::connect(client.clone(), target).await?,
        )),
        Platform::Pixelfed => Ok(Box::new(pixelfed::PixelfedClient::new(
            client.clone(),
            target,
        ))),
        Platform::Instagram => Ok(Box::new(instagram::InstagramClient::new(
            client.clone(),
            target,
        ))),
    }
}

/// Build the interaction source for a target, performing any login it needs.
///
/// # Errors
///
/// Returns an error if authentication fails.
pub async fn interaction_source(
    client: &reqwest::Client,
    target: &Target,
) -> Result<Box<dyn InteractionSource>, PlatformError> {
    match target.platform {
        Platform::Bluesky => Ok(Box::new(
            bluesky::BlueskyClient::connect(client.clone(), target).await?,
        )),
        Platform::Pixelfed => Ok(Box::new(pixelfed::PixelfedClient::new(
            client.clone(),
            target,
        ))),
        Platform::Instagram => Ok(Box::new(instagram::InstagramClient::new(
            client.clone(),
            target,
        ))),
    }
}
