use super::*;
use serde_json::json;
use skyrelay_core::{ErrorExt, UnitId};
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BlueskyClient {
    BlueskyClient::with_service(
        "relay.bsky.social".to_string(),
        "app-pass".to_string(),
        server.uri(),
    )
    .unwrap()
}

fn request(text: &str, media: Vec<PathBuf>) -> PublishRequest {
    PublishRequest {
        unit_id: UnitId::new("pics", "abc"),
        text: text.to_string(),
        media,
    }
}

async fn mount_session(server: &MockServer, expected_logins: u64) {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .and(body_partial_json(json!({ "identifier": "relay.bsky.social" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": "jwt-access",
            "refreshJwt": "jwt-refresh",
            "handle": "relay.bsky.social",
            "did": "did:plc:relay"
        })))
        .expect(expected_logins)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_text_post() {
    let server = MockServer::start().await;
    mount_session(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .and(bearer_token("jwt-access"))
        .and(body_partial_json(json!({
            "repo": "did:plc:relay",
            "collection": "app.bsky.feed.post",
            "record": { "$type": "app.bsky.feed.post", "text": "Hello 👋" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uri": "at://did:plc:relay/app.bsky.feed.post/3k1",
            "cid": "bafyrei1"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let receipt = client.publish(&request("Hello 👋", vec![])).await.unwrap();
    assert_eq!(receipt.uri, "at://did:plc:relay/app.bsky.feed.post/3k1");
    assert_eq!(receipt.cid, "bafyrei1");

    // The session is reused for the second post.
    client.publish(&request("Hello 👋", vec![])).await.unwrap();
    assert!(client.has_session().await);
}

#[tokio::test]
async fn test_images_are_uploaded_and_embedded() {
    let server = MockServer::start().await;
    mount_session(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.uploadBlob"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blob": { "$type": "blob", "ref": { "$link": "bafkblob" }, "mimeType": "image/png", "size": 4 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .and(body_partial_json(json!({
            "record": {
                "embed": {
                    "$type": "app.bsky.embed.images",
                    "images": [ { "alt": "Post image", "image": { "ref": { "$link": "bafkblob" } } } ]
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uri": "at://did:plc:relay/app.bsky.feed.post/3k2",
            "cid": "bafyrei2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let image = dir.path().join("abc.png");
    let video = dir.path().join("abc_1.mp4");
    std::fs::write(&image, b"\x89PNG").unwrap();
    std::fs::write(&video, b"mp4").unwrap();

    let receipt = client(&server)
        .publish(&request("With picture", vec![image, video]))
        .await
        .unwrap();
    assert_eq!(receipt.cid, "bafyrei2");
}

#[tokio::test]
async fn test_bad_login_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "AuthenticationRequired",
            "message": "Invalid identifier or password"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish(&request("hi", vec![]))
        .await
        .unwrap_err();
    match &err {
        CoreError::Publish(PublishError::AuthenticationFailed { reason }) => {
            assert_eq!(reason, "Invalid identifier or password")
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_expired_session_is_dropped_and_retryable() {
    let server = MockServer::start().await;
    mount_session(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "ExpiredToken",
            "message": "Token has expired"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uri": "at://did:plc:relay/app.bsky.feed.post/3k3",
            "cid": "bafyrei3"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.publish(&request("hi", vec![])).await.unwrap_err();
    assert!(matches!(err, CoreError::Publish(PublishError::SessionExpired)));
    assert!(err.is_retryable());
    assert!(!client.has_session().await);

    let receipt = client.publish(&request("hi", vec![])).await.unwrap();
    assert_eq!(receipt.cid, "bafyrei3");
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    mount_session(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish(&request("hi", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Publish(PublishError::RateLimitExceeded { retry_after: 12 })
    ));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
}
