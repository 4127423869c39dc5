//! XRPC request and response bodies.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use skyrelay_core::PublishError;
use std::path::Path;

pub const BLUESKY_SERVICE: &str = "https://bsky.social";
pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const IMAGES_EMBED: &str = "app.bsky.embed.images";
pub const MAX_IMAGES: usize = 4;
pub const IMAGE_ALT_TEXT: &str = "Post image";

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    #[serde(default)]
    pub refresh_jwt: Option<String>,
    pub did: String,
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadBlobResponse {
    /// Opaque blob reference, embedded verbatim in the post record.
    pub blob: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ImageEmbed {
    pub alt: String,
    pub image: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    #[serde(rename = "$type")]
    pub kind: &'static str,
    pub images: Vec<ImageEmbed>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub kind: &'static str,
    pub text: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

#[derive(Debug, Serialize)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'static str,
    pub record: PostRecord,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct XrpcError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl XrpcError {
    fn reason(&self, status: StatusCode) -> String {
        match (&self.error, &self.message) {
            (Some(error), Some(message)) => format!("{}: {}", error, message),
            (Some(error), None) => error.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => status.to_string(),
        }
    }
}

/// MIME type for an uploadable image, or `None` for anything else.
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Maps a failed XRPC call into the publish error taxonomy.
pub fn status_error(status: StatusCode, headers: &HeaderMap, body: &XrpcError) -> PublishError {
    if body.error.as_deref() == Some("ExpiredToken") || status == StatusCode::UNAUTHORIZED {
        return PublishError::SessionExpired;
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimitExceeded {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        s if s.is_server_error() => PublishError::ServerError {
            status_code: s.as_u16(),
        },
        s => PublishError::Rejected {
            reason: body.reason(s),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type(Path::new("a/b.JPG")), Some("image/jpeg"));
        assert_eq!(image_mime_type(Path::new("b.png")), Some("image/png"));
        assert_eq!(image_mime_type(Path::new("clip.mp4")), None);
        assert_eq!(image_mime_type(Path::new("noext")), None);
    }

    #[test]
    fn test_expired_token_maps_to_session_expired() {
        let body = XrpcError {
            error: Some("ExpiredToken".to_string()),
            message: Some("Token has expired".to_string()),
        };
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), &body),
            PublishError::SessionExpired
        ));
    }

    #[test]
    fn test_bad_request_is_rejected_with_reason() {
        let body = XrpcError {
            error: Some("InvalidRequest".to_string()),
            message: Some("Record/text must not be longer than 300 graphemes".to_string()),
        };
        match status_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), &body) {
            PublishError::Rejected { reason } => assert!(reason.starts_with("InvalidRequest")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_post_record_shape() {
        let record = PostRecord {
            kind: POST_COLLECTION,
            text: "hello".to_string(),
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            embed: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["$type"], "app.bsky.feed.post");
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00.000Z");
        assert!(value.get("embed").is_none());
    }
}
