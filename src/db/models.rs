use serde::{Deserialize, Serialize};

/// A publish target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bluesky,
    Pixelfed,
    Instagram,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bluesky => "bluesky",
            Self::Pixelfed => "pixelfed",
            Self::Instagram => "instagram",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bluesky" => Some(Self::Bluesky),
            "pixelfed" => Some(Self::Pixelfed),
            "instagram" => Some(Self::Instagram),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One publication fact: this feed item was posted to this platform.
///
/// At most one row exists per (`item_name`, `platform`). Identifier fields
/// are filled in by the publish cycle when the platform returns them, or
/// later by backfill reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublishRecord {
    pub id: i64,
    pub platform: String,
    pub item_name: String,
    pub post_url: Option<String>,
    pub version_id: Option<String>,
    pub post_id: Option<String>,
    pub created_at: String,
}

impl PublishRecord {
    /// Whether the platform-required identifier fields are all present.
    ///
    /// Bluesky posts are addressed by URI plus content identifier, pixelfed
    /// by URL plus status id, instagram by media id alone.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match Platform::from_str(&self.platform) {
            Some(Platform::Bluesky) => self.post_url.is_some() && self.version_id.is_some(),
            Some(Platform::Pixelfed) => self.post_url.is_some() && self.post_id.is_some(),
            Some(Platform::Instagram) => self.post_id.is_some(),
            None => self.post_url.is_some() && self.version_id.is_some() && self.post_id.is_some(),
        }
    }
}

/// A like count fetched back from a platform for a published item.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Interaction {
    pub id: i64,
    pub platform: String,
    pub item_name: String,
    pub like_count: i64,
    pub updated_at: String,
}

/// A publish record about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPublishRecord {
    pub platform: Platform,
    pub item_name: String,
    pub post_url: Option<String>,
    pub version_id: Option<String>,
    pub post_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(platform: &str) -> PublishRecord {
        PublishRecord {
            id: 1,
            platform: platform.to_string(),
            item_name: "sunset".to_string(),
            post_url: None,
            version_id: None,
            post_id: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn platform_round_trips() {
        for platform in [Platform::Bluesky, Platform::Pixelfed, Platform::Instagram] {
            assert_eq!(Platform::from_str(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::from_str("myspace"), None);
    }

    #[test]
    fn bluesky_needs_url_and_version() {
        let mut r = record("bluesky");
        assert!(!r.is_complete());
        r.post_url = Some("at://did:plc:abc/app.bsky.feed.post/1".to_string());
        assert!(!r.is_complete());
        r.version_id = Some("bafyrei".to_string());
        assert!(r.is_complete());
    }

    #[test]
    fn pixelfed_needs_url_and_post_id() {
        let mut r = record("pixelfed");
        r.post_url = Some("https://pixelfed.social/p/1".to_string());
        assert!(!r.is_complete());
        r.post_id = Some("1".to_string());
        assert!(r.is_complete());
    }

    #[test]
    fn instagram_needs_post_id_only() {
        let mut r = record("instagram");
        assert!(!r.is_complete());
        r.post_id = Some("17900000000000000".to_string());
        assert!(r.is_complete());
    }
}
