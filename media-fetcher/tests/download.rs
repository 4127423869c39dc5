use media_fetcher::{HttpDownloader, MediaDownloader, YtDlp};
use skyrelay_core::{CoreError, ErrorExt, MediaFetchError, MediaFetcher};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader(max_bytes: u64) -> MediaDownloader {
    let http = HttpDownloader::new(max_bytes, Duration::from_secs(5)).unwrap();
    MediaDownloader::new(http, YtDlp::new("definitely-not-installed-yt-dlp"))
}

#[tokio::test]
async fn test_downloads_image_with_content_type_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/photo.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![7u8; 1024]),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/img/photo.jpg", server.uri());
    let saved = downloader(10_000)
        .fetch(&url, dir.path(), "abc")
        .await
        .unwrap();

    assert_eq!(saved, dir.path().join("abc.png"));
    assert_eq!(std::fs::metadata(&saved).unwrap().len(), 1024);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_and_removed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0u8; 4096]),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/big.jpg", server.uri());
    let err = downloader(1000)
        .fetch(&url, dir.path(), "big")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::MediaFetch(MediaFetchError::TooLarge { limit: 1000, .. })
    ));
    assert!(!err.is_retryable());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unexpected_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html></html>"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/page.jpg", server.uri());
    let err = downloader(10_000)
        .fetch(&url, dir.path(), "page")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::MediaFetch(MediaFetchError::UnsupportedContentType { .. })
    ));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/clip.mp4", server.uri());
    let err = downloader(10_000)
        .fetch(&url, dir.path(), "clip")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::MediaFetch(MediaFetchError::DownloadFailed { status_code: 503, .. })
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unsupported_url() {
    let dir = TempDir::new().unwrap();
    let err = downloader(10_000)
        .fetch("https://example.com/article", dir.path(), "x")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::MediaFetch(MediaFetchError::UnsupportedUrl { .. })
    ));
}

#[tokio::test]
async fn test_hosted_video_without_tool() {
    let dir = TempDir::new().unwrap();
    let err = downloader(10_000)
        .fetch("https://v.redd.it/abcdef", dir.path(), "vid")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::MediaFetch(MediaFetchError::ToolUnavailable { .. })
    ));
}
