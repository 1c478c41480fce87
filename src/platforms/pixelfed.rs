//! Pixelfed (Mastodon-compatible) adapter.
//!
//! Media is staged with a multipart upload, the status is created with a
//! form-encoded request, and history pagination is id-based backward
//! paging: each page's last status id becomes the next page's `max_id`,
//! and an empty page means done.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    check_status, HistorySource, InteractionSource, MediaRef, MediaSource, PlatformError,
    PlatformPost, PostIdentifiers, PublishAdapter,
};
use crate::config::Target;
use crate::retry::RetryPolicy;

const PAGE_LIMIT: u32 = 40;

pub struct PixelfedClient {
    http: reqwest::Client,
    base: String,
    token: String,
    retry: RetryPolicy,
}

impl PixelfedClient {
    #[must_use]
    pub fn new(http: reqwest::Client, target: &Target) -> Self {
        Self {
            http,
            base: target.instance_url().to_string(),
            token: target.access_token.clone(),
            retry: RetryPolicy::default(),
        }
    }

    /// Look up the account id behind the access token.
    async fn account_id(&self) -> Result<String, PlatformError> {
        let response = self
            .http
            .get(format!("{}/api/v1/accounts/verify_credentials", self.base))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PlatformError::Auth(
                "access token rejected by instance".to_string(),
            ));
        }
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct Account {
            id: String,
        }

        let account: Account = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("account response: {e}")))?;
        Ok(account.id)
    }

    async fn fetch_statuses_page(
        &self,
        account_id: &str,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>, PlatformError> {
        let mut url = format!(
            "{}/api/v1/accounts/{account_id}/statuses?limit={PAGE_LIMIT}",
            self.base
        );
        if let Some(max_id) = max_id {
            url.push_str("&max_id=");
            url.push_str(max_id);
        }

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("statuses response: {e}")))
    }
}

#[async_trait]
impl PublishAdapter for PixelfedClient {
    async fn upload_media(&self, media: MediaSource<'_>) -> Result<MediaRef, PlatformError> {
        let file = reqwest::multipart::Part::bytes(media.bytes.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("description", media.alt_text.to_string());

        let response = self
            .http
            .post(format!("{}/api/v1/media", self.base))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct Media {
            id: String,
        }

        let uploaded: Media = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("media response: {e}")))?;
        Ok(MediaRef(uploaded.id))
    }

    async fn create_post(
        &self,
        caption: &str,
        media: &MediaRef,
    ) -> Result<PostIdentifiers, PlatformError> {
        if caption.trim().is_empty() {
            return Err(PlatformError::NotCreated("caption cannot be empty".to_string()));
        }

        let response = self
            .http
            .post(format!("{}/api/v1/statuses", self.base))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .form(&[("status", caption), ("media_ids[]", &media.0)])
            .send()
            .await?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct Created {
            id: String,
            url: String,
        }

        let created: Created = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("status response: {e}")))?;

        Ok(PostIdentifiers {
            post_url: Some(created.url),
            version_id: None,
            post_id: Some(created.id),
        })
    }
}

#[async_trait]
impl HistorySource for PixelfedClient {
    async fn fetch_history(&self) -> Result<Vec<PlatformPost>, PlatformError> {
        let account_id = self.account_id().await?;

        let mut posts = Vec::new();
        let mut max_id: Option<String> = None;

        loop {
            let page = self
                .retry
                .run(|| self.fetch_statuses_page(&account_id, max_id.as_deref()))
                .await?;

            if page.is_empty() {
                break;
            }

            max_id = page.last().map(|s| s.id.clone());
            for status in page {
                posts.push(PlatformPost {
                    id: Some(status.id),
                    url: Some(status.url),
                    version: None,
                    image_url: status.media_attachments.into_iter().next().map(|m| m.url),
                });
            }
            debug!(total = posts.len(), "Fetched statuses page");
        }

        Ok(posts)
    }
}

#[async_trait]
impl InteractionSource for PixelfedClient {
    async fn like_count(&self, identifiers: &PostIdentifiers) -> Result<u64, PlatformError> {
        let post_id = identifiers
            .post_id
            .as_deref()
            .ok_or_else(|| PlatformError::Malformed("record is missing its status id".to_string()))?;

        let response = self
            .http
            .get(format!(
                "{}/api/v1/statuses/{post_id}/favourited_by",
                self.base
            ))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(response).await?;

        // The endpoint returns the liking accounts; the count is their
        // number.
        let accounts: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("favourited_by response: {e}")))?;
        Ok(accounts.len() as u64)
    }
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    url: String,
    #[serde(default)]
    media_attachments: Vec<MediaAttachment>,
}

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    url: String,
}
