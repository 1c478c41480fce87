//! Source feed fetching and normalization.
//!
//! The companion's inventory is a plain web feed of images. Each entry is
//! reduced to the fields the selector and adapters care about: the stable
//! title (used as the item name), the image URL, category tags, the raw
//! description (which may embed alt text), and the published timestamp.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;

/// One feed entry, parsed fresh on every run.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub categories: Vec<String>,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Fetch and parse the feed at `feed_url`.
///
/// # Errors
///
/// Returns an error if the feed cannot be fetched or parsed; the caller
/// treats that as fatal for the connection's run.
pub async fn fetch_entries(client: &reqwest::Client, feed_url: &str) -> Result<Vec<FeedEntry>> {
    let response = client
        .get(feed_url)
        .header("User-Agent", "site-companion/0.1")
        .send()
        .await
        .context("Failed to fetch feed")?;

    if !response.status().is_success() {
        anyhow::bail!("feed fetch failed with status {}", response.status());
    }

    let body = response.bytes().await.context("Failed to read feed body")?;
    let feed = feed_rs::parser::parse(&body[..]).context("Failed to parse feed")?;

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.as_ref().map(|t| t.content.clone())?;
            let image_url = entry_image_url(&entry);
            Some(FeedEntry {
                title,
                link: entry.links.first().map(|l| l.href.clone()),
                image_url,
                categories: entry.categories.iter().map(|c| c.term.clone()).collect(),
                description: entry.summary.as_ref().map(|s| s.content.clone()),
                published: entry.published,
            })
        })
        .collect();

    Ok(entries)
}

/// Pick the entry's image URL from its media attachments.
///
/// Feeds express the image as a media content object or, failing that, a
/// thumbnail. Entries without either are not publishable.
fn entry_image_url(entry: &feed_rs::model::Entry) -> Option<String> {
    for media in &entry.media {
        if let Some(url) = media.content.iter().find_map(|c| c.url.as_ref()) {
            return Some(url.to_string());
        }
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
    }
    None
}

/// Extract the alt text embedded in a description's HTML, if any.
#[must_use]
pub fn extract_alt_text(html: &str) -> Option<String> {
    let re = Regex::new(r#"alt="([^"]*)""#).ok()?;
    re.captures(html)
        .map(|caps| caps[1].to_string())
        .filter(|alt| !alt.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_alt_text_from_description() {
        let html = r#"<p><img src="/img/cat.jpg" alt="A cat on a roof"/></p>"#;
        assert_eq!(extract_alt_text(html).as_deref(), Some("A cat on a roof"));
    }

    #[test]
    fn missing_or_empty_alt_yields_none() {
        assert_eq!(extract_alt_text("<p>no image here</p>"), None);
        assert_eq!(extract_alt_text(r#"<img src="x.jpg" alt=""/>"#), None);
    }

    #[tokio::test]
    async fn parses_rss_media_entries() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
              <channel>
                <title>Gallery</title>
                <item>
                  <title>Sunset</title>
                  <link>https://example.net/gallery/sunset</link>
                  <description>&lt;img src="s.jpg" alt="Sun over water"/&gt;</description>
                  <category>sunset</category>
                  <category>sea</category>
                  <pubDate>Tue, 04 Jun 2019 18:30:00 GMT</pubDate>
                  <media:content url="https://example.net/img/sunset.jpg" type="image/jpeg"/>
                </item>
                <item>
                  <title>No image</title>
                </item>
              </channel>
            </rss>"#;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(rss, "application/rss+xml"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_entries(&client, &server.uri()).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Sunset");
        assert_eq!(
            entries[0].image_url.as_deref(),
            Some("https://example.net/img/sunset.jpg")
        );
        assert_eq!(entries[0].categories, vec!["sunset", "sea"]);
        assert!(entries[0].published.is_some());
        assert_eq!(entries[1].image_url, None);
    }
}
