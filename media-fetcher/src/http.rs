//! Direct downloads of image and video files.

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use skyrelay_core::{CoreError, MediaFetchError, MediaKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "video/mp4",
    "video/webm",
    "application/octet-stream",
];

const KNOWN_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".mp4", ".webm", ".mov"];

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    max_bytes: u64,
}

impl HttpDownloader {
    pub fn new(max_bytes: u64, timeout: Duration) -> Result<Self, CoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, max_bytes })
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Streams `url` into `{dest_dir}/{stem}{ext}`.
    pub async fn download(
        &self,
        url: &str,
        kind: MediaKind,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, CoreError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaFetchError::DownloadFailed {
                url: url.to_string(),
                status_code: status.as_u16(),
            }
            .into());
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.max_bytes {
                return Err(MediaFetchError::TooLarge {
                    size: content_len,
                    limit: self.max_bytes,
                }
                .into());
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| essence(value).to_string());
        if let Some(ct) = content_type.as_deref() {
            if !ALLOWED_CONTENT_TYPES.contains(&ct) {
                return Err(MediaFetchError::UnsupportedContentType {
                    url: url.to_string(),
                    content_type: ct.to_string(),
                }
                .into());
            }
        }

        let ext = extension_for(content_type.as_deref(), url, kind);
        let target = dest_dir.join(format!("{}{}", stem, ext));
        debug!("Downloading {} to {}", url, target.display());

        let mut file = File::create(&target).await?;
        let mut written: u64 = 0;
        let streamed: Result<(), CoreError> = async {
            while let Some(chunk) = response.chunk().await? {
                written += chunk.len() as u64;
                if written > self.max_bytes {
                    return Err(CoreError::from(MediaFetchError::TooLarge {
                        size: written,
                        limit: self.max_bytes,
                    }));
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&target).await {
                warn!("Could not remove partial file {}: {}", target.display(), remove_err);
            }
            return Err(e);
        }

        info!("Downloaded {} ({} bytes)", target.display(), written);
        Ok(target)
    }
}

/// `image/jpeg; charset=binary` -> `image/jpeg`
fn essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Picks the file extension from the content type, then the URL path, then the media kind.
pub fn extension_for(content_type: Option<&str>, url: &str, kind: MediaKind) -> &'static str {
    let from_type = match content_type {
        Some("image/jpeg") | Some("image/jpg") => Some(".jpg"),
        Some("image/png") => Some(".png"),
        Some("image/gif") => Some(".gif"),
        Some("video/mp4") => Some(".mp4"),
        Some("video/webm") => Some(".webm"),
        _ => None,
    };
    if let Some(ext) = from_type {
        return ext;
    }

    let from_path = Url::parse(url).ok().and_then(|parsed| {
        let path = parsed.path().to_ascii_lowercase();
        KNOWN_EXTENSIONS
            .iter()
            .copied()
            .find(|ext| path.ends_with(ext))
    });
    match from_path {
        Some(".jpeg") => ".jpg",
        Some(ext) => ext,
        None if kind.is_image() => ".jpg",
        None => ".mp4",
    }
}
