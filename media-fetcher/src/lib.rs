//! Downloads post media into a unit's media directory.
//!
//! Direct file links are streamed over HTTP; pages on video hosts go through
//! `yt-dlp`.

pub mod http;
pub mod ytdlp;

pub use http::HttpDownloader;
pub use ytdlp::YtDlp;

use async_trait::async_trait;
use skyrelay_core::{CoreError, GlobalConfig, MediaFetchError, MediaFetcher, MediaKind};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct MediaDownloader {
    http: HttpDownloader,
    ytdlp: YtDlp,
}

impl MediaDownloader {
    pub fn new(http: HttpDownloader, ytdlp: YtDlp) -> Self {
        Self { http, ytdlp }
    }

    pub fn from_config(config: &GlobalConfig) -> Result<Self, CoreError> {
        let http = HttpDownloader::new(config.max_media_bytes, config.default_timeout())?;
        Ok(Self::new(
            http,
            YtDlp::default().with_max_bytes(config.max_media_bytes),
        ))
    }
}

#[async_trait]
impl MediaFetcher for MediaDownloader {
    async fn fetch(&self, url: &str, dest_dir: &Path, stem: &str) -> Result<PathBuf, CoreError> {
        let kind = MediaKind::classify(url).ok_or_else(|| MediaFetchError::UnsupportedUrl {
            url: url.to_string(),
        })?;
        debug!("Fetching {:?} media from {}", kind, url);

        match kind {
            MediaKind::HostedVideo => self.ytdlp.download(url, dest_dir, stem).await,
            MediaKind::DirectImage | MediaKind::DirectVideo | MediaKind::HostedImage => {
                self.http.download(url, kind, dest_dir, stem).await
            }
        }
    }
}
