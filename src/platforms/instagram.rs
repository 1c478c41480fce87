//! Instagram Graph API adapter.
//!
//! Instagram fetches the image itself from a public URL, so "uploading"
//! just reserves the source URL; posting creates a media container,
//! polls it until processing finishes, then publishes the container.
//! History pagination is link-based: each response carries the full URL
//! of the next page, and its absence means done.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{
    check_status, urlencode, HistorySource, InteractionSource, MediaRef, MediaSource,
    PlatformError, PlatformPost, PostIdentifiers, PublishAdapter,
};
use crate::config::Target;
use crate::retry::RetryPolicy;

/// Container status polls before giving up on processing.
const STATUS_POLL_ATTEMPTS: u32 = 10;
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct InstagramClient {
    http: reqwest::Client,
    base: String,
    account_id: String,
    access_token: String,
    retry: RetryPolicy,
}

impl InstagramClient {
    #[must_use]
    pub fn new(http: reqwest::Client, target: &Target) -> Self {
        Self {
            http,
            base: target.instance_url().to_string(),
            account_id: target.account_id.clone().unwrap_or_default(),
            access_token: target.access_token.clone(),
            retry: RetryPolicy::default(),
        }
    }

    async fn create_container(
        &self,
        caption: &str,
        image_url: &str,
    ) -> Result<String, PlatformError> {
        let response = self
            .http
            .post(format!("{}/{}/media", self.base, self.account_id))
            .form(&[
                ("access_token", self.access_token.as_str()),
                ("caption", caption),
                ("image_url", image_url),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("container response: {e}")))?;
        // No container id means nothing was created; the item must stay
        // eligible for the next cycle.
        body.get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                PlatformError::NotCreated(format!("failed to create media container: {body}"))
            })
    }

    async fn container_status(&self, container_id: &str) -> Result<String, PlatformError> {
        let response = self
            .http
            .get(format!(
                "{}/{container_id}?fields=status_code&access_token={}",
                self.base,
                urlencode(&self.access_token)
            ))
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("status response: {e}")))?;
        body.get("status_code")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| PlatformError::Malformed(format!("status not found: {body}")))
    }

    async fn publish_container(&self, container_id: &str) -> Result<String, PlatformError> {
        let response = self
            .http
            .post(format!("{}/{}/media_publish", self.base, self.account_id))
            .form(&[
                ("access_token", self.access_token.as_str()),
                ("creation_id", container_id),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("publish response: {e}")))?;
        body.get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| PlatformError::Malformed(format!("failed to publish container: {body}")))
    }

    async fn fetch_media_page(&self, page_url: &str) -> Result<MediaResponse, PlatformError> {
        let response = self.http.get(page_url).send().await?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("media response: {e}")))
    }
}

#[async_trait]
impl PublishAdapter for InstagramClient {
    async fn upload_media(&self, media: MediaSource<'_>) -> Result<MediaRef, PlatformError> {
        // The Graph API pulls the image from a public URL at container
        // creation time; there is nothing to upload here.
        Ok(MediaRef(media.source_url.to_string()))
    }

    async fn create_post(
        &self,
        caption: &str,
        media: &MediaRef,
    ) -> Result<PostIdentifiers, PlatformError> {
        let container_id = self.create_container(caption, &media.0).await?;

        let mut finished = false;
        for attempt in 1..=STATUS_POLL_ATTEMPTS {
            match self.container_status(&container_id).await {
                Ok(status) => {
                    debug!(attempt, %status, "Container status");
                    if status == "FINISHED" {
                        finished = true;
                        break;
                    }
                }
                Err(e) => debug!(attempt, "Container status check failed: {e}"),
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }

        // An unfinished container was never published; only the publish
        // call below can bring a post into existence.
        if !finished {
            return Err(PlatformError::NotCreated(
                "media container was not ready after waiting".to_string(),
            ));
        }

        let post_id = self.publish_container(&container_id).await?;
        Ok(PostIdentifiers {
            post_url: None,
            version_id: None,
            post_id: Some(post_id),
        })
    }
}

#[async_trait]
impl HistorySource for InstagramClient {
    async fn fetch_history(&self) -> Result<Vec<PlatformPost>, PlatformError> {
        let mut posts = Vec::new();
        let mut next_url = Some(format!(
            "{}/{}/media?fields=id,media_url&access_token={}",
            self.base,
            self.account_id,
            urlencode(&self.access_token)
        ));

        while let Some(page_url) = next_url {
            let page = self.retry.run(|| self.fetch_media_page(&page_url)).await?;

            for item in page.data {
                posts.push(PlatformPost {
                    id: Some(item.id),
                    url: None,
                    version: None,
                    image_url: item.media_url,
                });
            }
            debug!(total = posts.len(), "Fetched media page");

            next_url = page.paging.and_then(|p| p.next);
        }

        Ok(posts)
    }
}

#[async_trait]
impl InteractionSource for InstagramClient {
    async fn like_count(&self, identifiers: &PostIdentifiers) -> Result<u64, PlatformError> {
        let media_id = identifiers
            .post_id
            .as_deref()
            .ok_or_else(|| PlatformError::Malformed("record is missing its media id".to_string()))?;

        let response = self
            .http
            .get(format!(
                "{}/{media_id}?fields=like_count&access_token={}",
                self.base,
                urlencode(&self.access_token)
            ))
            .send()
            .await?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct Likes {
            #[serde(default)]
            like_count: u64,
        }

        let likes: Likes = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("like count response: {e}")))?;
        Ok(likes.like_count)
    }
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    #[serde(default)]
    data: Vec<MediaItem>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    id: String,
    media_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}
