use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use skyrelay_core::{CommentRecord, PostRecord, SourceFetchError};
use tracing::{debug, error, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub is_gallery: Option<bool>,
    #[serde(default)]
    pub gallery_data: Option<RedditGalleryData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditGalleryData {
    pub items: Vec<RedditGalleryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditGalleryItem {
    pub media_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
}

impl RedditPostData {
    /// Media URLs in display order: gallery items first-to-last, the link
    /// target for link posts, nothing for self posts.
    pub fn media_urls(&self) -> Vec<String> {
        if self.is_self {
            return Vec::new();
        }
        if self.is_gallery.unwrap_or(false) {
            if let Some(gallery) = &self.gallery_data {
                return gallery
                    .items
                    .iter()
                    .map(|item| format!("https://i.redd.it/{}.jpg", item.media_id))
                    .collect();
            }
        }
        if self.url.is_empty() {
            Vec::new()
        } else {
            vec![self.url.clone()]
        }
    }

    pub fn into_record(self, source_name: &str) -> PostRecord {
        let media_urls = self.media_urls();
        PostRecord {
            id: self.id,
            source_name: source_name.to_string(),
            title: self.title,
            body_url: self.url,
            selftext: Some(self.selftext).filter(|s| !s.is_empty()),
            author: self.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            created_at: timestamp(self.created_utc),
            score: self.score,
            media_urls,
        }
    }
}

impl From<RedditCommentData> for CommentRecord {
    fn from(comment: RedditCommentData) -> Self {
        Self {
            author: comment.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            body: comment.body,
            score: comment.score,
            created_at: timestamp(comment.created_utc),
            stickied: comment.stickied,
        }
    }
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(created_utc as i64, 0).unwrap_or_default()
}

/// Pulls the comment objects out of a `/comments/{id}` response, which is a
/// pair of listings: the post itself, then its top-level comments. `more`
/// stubs and unparseable children are dropped.
pub fn extract_comments(listings: Vec<RedditListing<serde_json::Value>>) -> Vec<CommentRecord> {
    listings
        .into_iter()
        .nth(1)
        .map(|listing| listing.data.children)
        .unwrap_or_default()
        .into_iter()
        .filter(|child| child.kind == "t1")
        .filter_map(|child| match serde_json::from_value::<RedditCommentData>(child.data) {
            Ok(comment) => Some(comment.into()),
            Err(e) => {
                debug!("Skipping unparseable comment: {}", e);
                None
            }
        })
        .collect()
}

/// Maps a non-success status into the source error taxonomy.
pub fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    endpoint: &str,
    source_name: &str,
) -> SourceFetchError {
    error!("Request failed with status: {} for {}", status, endpoint);
    match status.as_u16() {
        429 => {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!("Rate limited, retry after {} seconds", retry_after);
            SourceFetchError::RateLimitExceeded { retry_after }
        }
        401 => SourceFetchError::InvalidToken,
        403 => SourceFetchError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => SourceFetchError::SourceNotFound {
            source_name: source_name.to_string(),
        },
        code if status.is_server_error() => SourceFetchError::ServerError { status_code: code },
        code => SourceFetchError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    }
}
