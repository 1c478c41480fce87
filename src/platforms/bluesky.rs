//! Bluesky (AT Protocol) adapter.
//!
//! Login happens once per client; the session JWT authenticates blob
//! uploads, record creation and the author-feed history scan. History
//! pagination is cursor-token based: the server hands back an opaque
//! cursor, and an absent cursor or empty page means done.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_status, urlencode, HistorySource, InteractionSource, MediaRef, MediaSource,
    PlatformError, PlatformPost, PostIdentifiers, PublishAdapter,
};
use crate::config::Target;
use crate::retry::RetryPolicy;

const PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, Deserialize)]
struct Session {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
    #[allow(dead_code)]
    handle: String,
}

pub struct BlueskyClient {
    http: reqwest::Client,
    base: String,
    session: Session,
    retry: RetryPolicy,
}

impl BlueskyClient {
    /// Authenticate against the service and return a ready client.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` on HTTP 429, `Auth` on any other login
    /// failure.
    pub async fn connect(http: reqwest::Client, target: &Target) -> Result<Self, PlatformError> {
        let base = target.instance_url().to_string();
        let identifier = target.username.clone().unwrap_or_default();

        let response = http
            .post(format!("{base}/xrpc/com.atproto.server.createSession"))
            .json(&json!({
                "identifier": identifier,
                "password": target.access_token,
            }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PlatformError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(PlatformError::Auth(format!(
                "login failed with status {}",
                response.status()
            )));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("session response: {e}")))?;

        Ok(Self {
            http,
            base,
            session,
            retry: RetryPolicy::default(),
        })
    }

    async fn fetch_feed_page(&self, cursor: Option<&str>) -> Result<FeedResponse, PlatformError> {
        let mut url = format!(
            "{}/xrpc/app.bsky.feed.getAuthorFeed?actor={}&limit={PAGE_LIMIT}",
            self.base,
            urlencode(&self.session.did),
        );
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(&urlencode(cursor));
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.session.access_jwt)
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("author feed response: {e}")))
    }
}

#[async_trait]
impl PublishAdapter for BlueskyClient {
    async fn upload_media(&self, media: MediaSource<'_>) -> Result<MediaRef, PlatformError> {
        let response = self
            .http
            .post(format!("{}/xrpc/com.atproto.repo.uploadBlob", self.base))
            .bearer_auth(&self.session.access_jwt)
            .header("Content-Type", "image/jpeg")
            .body(media.bytes.to_vec())
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("blob response: {e}")))?;
        let blob = body
            .get("blob")
            .cloned()
            .ok_or_else(|| PlatformError::Malformed("blob response missing blob".to_string()))?;

        // The blob ref and alt text both belong in the post embed; carry
        // them together as the opaque media reference.
        let reference = json!({ "blob": blob, "alt": media.alt_text });
        Ok(MediaRef(reference.to_string()))
    }

    async fn create_post(
        &self,
        caption: &str,
        media: &MediaRef,
    ) -> Result<PostIdentifiers, PlatformError> {
        // Nothing has been posted yet; a broken reference must not mark
        // the item as published.
        let reference: Value = serde_json::from_str(&media.0)
            .map_err(|e| PlatformError::NotCreated(format!("media reference: {e}")))?;
        let blob = reference.get("blob").cloned().unwrap_or(Value::Null);
        let alt = reference
            .get("alt")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let record = json!({
            "collection": "app.bsky.feed.post",
            "repo": self.session.did,
            "record": {
                "$type": "app.bsky.feed.post",
                "text": caption,
                "createdAt": Utc::now().to_rfc3339(),
                "langs": ["en"],
                "facets": extract_facets(caption),
                "embed": {
                    "$type": "app.bsky.embed.images",
                    "images": [{ "image": blob, "alt": alt }],
                },
            },
        });

        let response = self
            .http
            .post(format!("{}/xrpc/com.atproto.repo.createRecord", self.base))
            .bearer_auth(&self.session.access_jwt)
            .json(&record)
            .send()
            .await?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct CreateResponse {
            uri: String,
            cid: String,
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("create record response: {e}")))?;

        Ok(PostIdentifiers {
            post_url: Some(created.uri),
            version_id: Some(created.cid),
            post_id: None,
        })
    }
}

#[async_trait]
impl HistorySource for BlueskyClient {
    async fn fetch_history(&self) -> Result<Vec<PlatformPost>, PlatformError> {
        let mut posts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .retry
                .run(|| self.fetch_feed_page(cursor.as_deref()))
                .await?;

            if page.feed.is_empty() {
                break;
            }

            for item in page.feed {
                posts.push(PlatformPost {
                    id: None,
                    url: Some(item.post.uri),
                    version: Some(item.post.cid),
                    image_url: item
                        .post
                        .embed
                        .and_then(|e| e.images.into_iter().next())
                        .and_then(|i| i.fullsize),
                });
            }
            debug!(total = posts.len(), "Fetched author feed page");

            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(posts)
    }
}

#[async_trait]
impl InteractionSource for BlueskyClient {
    async fn like_count(&self, identifiers: &PostIdentifiers) -> Result<u64, PlatformError> {
        let (Some(uri), Some(cid)) = (
            identifiers.post_url.as_deref(),
            identifiers.version_id.as_deref(),
        ) else {
            return Err(PlatformError::Malformed(
                "record is missing its post URI or version".to_string(),
            ));
        };

        let response = self
            .http
            .get(format!(
                "{}/xrpc/app.bsky.feed.getLikes?uri={}&cid={}",
                self.base,
                urlencode(uri),
                urlencode(cid),
            ))
            .bearer_auth(&self.session.access_jwt)
            .send()
            .await?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct LikesResponse {
            #[serde(default)]
            likes: Vec<Value>,
        }

        let likes: LikesResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(format!("likes response: {e}")))?;
        Ok(likes.likes.len() as u64)
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    post: FeedPost,
}

#[derive(Debug, Deserialize)]
struct FeedPost {
    uri: String,
    cid: String,
    embed: Option<FeedEmbed>,
}

#[derive(Debug, Deserialize)]
struct FeedEmbed {
    #[serde(default)]
    images: Vec<FeedImage>,
}

#[derive(Debug, Deserialize)]
struct FeedImage {
    fullsize: Option<String>,
}

/// Rich-text facets for hashtags and URLs, indexed by byte offset.
fn extract_facets(text: &str) -> Vec<Value> {
    let mut facets = Vec::new();

    if let Ok(hashtag) = Regex::new(r"#\w+") {
        for m in hashtag.find_iter(text) {
            facets.push(json!({
                "index": { "byteStart": m.start(), "byteEnd": m.end() },
                "features": [{
                    "$type": "app.bsky.richtext.facet#tag",
                    "tag": &text[m.start() + 1..m.end()],
                }],
            }));
        }
    }

    if let Ok(link) = Regex::new(r"https?://\S+") {
        for m in link.find_iter(text) {
            facets.push(json!({
                "index": { "byteStart": m.start(), "byteEnd": m.end() },
                "features": [{
                    "$type": "app.bsky.richtext.facet#link",
                    "uri": m.as_str(),
                }],
            }));
        }
    }

    facets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_cover_hashtags_and_links() {
        let text = "New photo!\n\n#sunset #sea https://example.net/p/1";
        let facets = extract_facets(text);
        assert_eq!(facets.len(), 3);

        let tag = &facets[0];
        assert_eq!(tag["features"][0]["tag"], "sunset");
        let start = tag["index"]["byteStart"].as_u64().unwrap() as usize;
        let end = tag["index"]["byteEnd"].as_u64().unwrap() as usize;
        assert_eq!(&text[start..end], "#sunset");

        assert_eq!(facets[2]["features"][0]["uri"], "https://example.net/p/1");
    }

    #[test]
    fn facets_empty_for_plain_text() {
        assert!(extract_facets("just words").is_empty());
    }
}
