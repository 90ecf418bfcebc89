//! Download client for curated post feeds
//!
//! The feed service returns one JSON-encoded post per line in the same
//! camelCase shape as [`Event`].

use postsift_core::{Error, Event, Result};
use std::time::Duration;
use tracing::{debug, info};

pub struct FeedClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("postsift/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn download_url(&self, feed: &str) -> String {
        format!("{}/api/download?feed={}", self.base_url, feed)
    }

    /// Fetch every post of `feed`
    pub async fn download(&self, feed: &str) -> Result<Vec<Event>> {
        let url = self.download_url(feed);
        debug!(url = %url, "Downloading feed");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("could not download feed {}: {}", feed, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: {}", url, e)))?;
        let posts = parse_feed(&body)?;
        info!(feed, posts = posts.len(), "Fetched feed");
        Ok(posts)
    }
}

/// Parse a newline-delimited JSON feed body, ignoring blank lines
pub fn parse_feed(body: &str) -> Result<Vec<Event>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_skips_blank_lines() {
        let body = concat!(
            r#"{"author":"did:plc:a","text":"new crate","createdAt":"2024-11-20T10:00:00Z","uri":"at://did:plc:a/app.bsky.feed.post/1","cid":"c1","isReply":false}"#,
            "\n\n",
            r#"{"author":"did:plc:b","text":"see github.com/x/y","createdAt":"2024-11-20T10:00:01Z","uri":"at://did:plc:b/app.bsky.feed.post/2","cid":"c2"}"#,
            "\n",
        );

        let posts = parse_feed(body).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text, "new crate");
        assert_eq!(posts[1].cid, "c2");
        assert!(!posts[1].is_reply);
    }

    #[test]
    fn test_parse_feed_rejects_bad_json() {
        let err = parse_feed("{\"author\":\n").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_download_url() {
        let client = FeedClient::new("https://feeds.example/").unwrap();
        assert_eq!(
            client.download_url("githubrepos"),
            "https://feeds.example/api/download?feed=githubrepos"
        );
    }
}
