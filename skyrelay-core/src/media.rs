//! Media URL classification shared by the harvest stage and the fetcher.

use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov"];
const IMAGE_HOSTS: &[&str] = &["i.redd.it", "i.imgur.com", "preview.redd.it"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A URL whose path ends in an image extension.
    DirectImage,
    /// A URL whose path ends in a video extension.
    DirectVideo,
    /// A page on a video host that needs an extractor (yt-dlp).
    HostedVideo,
    /// A known image host serving files without an extension.
    HostedImage,
}

impl MediaKind {
    /// Returns `None` for URLs we do not know how to fetch.
    pub fn classify(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let path = url.path().to_ascii_lowercase();
        if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Some(MediaKind::DirectImage);
        }
        if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Some(MediaKind::DirectVideo);
        }

        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        if is_video_host(host, &url) {
            return Some(MediaKind::HostedVideo);
        }
        if IMAGE_HOSTS.contains(&host) {
            return Some(MediaKind::HostedImage);
        }
        None
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MediaKind::DirectImage | MediaKind::HostedImage)
    }
}

fn is_video_host(host: &str, url: &Url) -> bool {
    match host {
        "youtube.com" | "m.youtube.com" => {
            url.path() == "/watch" && url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty())
        }
        "youtu.be" => url.path().len() > 1,
        "v.redd.it" | "imgur.com" | "m.imgur.com" => true,
        _ => host == "redgifs.com" || host.ends_with(".redgifs.com"),
    }
}

/// File stem for the `index`-th media item of a post.
pub fn media_stem(post_id: &str, index: usize) -> String {
    if index == 0 {
        post_id.to_string()
    } else {
        format!("{}_{}", post_id, index)
    }
}

/// True when at least one URL can be fetched.
pub fn has_resolvable_media(urls: &[String]) -> bool {
    urls.iter().any(|u| MediaKind::classify(u).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_extensions_win() {
        assert_eq!(
            MediaKind::classify("https://i.redd.it/abc.png"),
            Some(MediaKind::DirectImage)
        );
        assert_eq!(
            MediaKind::classify("https://i.imgur.com/abc.JPG?x=1"),
            Some(MediaKind::DirectImage)
        );
        assert_eq!(
            MediaKind::classify("https://example.com/clip.webm"),
            Some(MediaKind::DirectVideo)
        );
    }

    #[test]
    fn test_media_stem() {
        assert_eq!(media_stem("abc", 0), "abc");
        assert_eq!(media_stem("abc", 1), "abc_1");
        assert_eq!(media_stem("abc", 3), "abc_3");
    }

    #[test]
    fn test_video_hosts() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.redgifs.com/watch/someclip",
            "https://imgur.com/gallery/xyz",
            "https://v.redd.it/abcdef",
        ] {
            assert_eq!(MediaKind::classify(url), Some(MediaKind::HostedVideo), "{url}");
        }
        assert_eq!(MediaKind::classify("https://www.youtube.com/channel/x"), None);
    }

    #[test]
    fn test_image_hosts_and_unsupported() {
        assert_eq!(
            MediaKind::classify("https://preview.redd.it/abc"),
            Some(MediaKind::HostedImage)
        );
        assert_eq!(MediaKind::classify("https://example.com/article"), None);
        assert_eq!(MediaKind::classify("not a url"), None);
        assert_eq!(MediaKind::classify("ftp://example.com/a.png"), None);
    }

    #[test]
    fn test_has_resolvable_media() {
        assert!(!has_resolvable_media(&[]));
        assert!(!has_resolvable_media(&["https://example.com/post".to_string()]));
        assert!(has_resolvable_media(&[
            "https://example.com/post".to_string(),
            "https://i.redd.it/a.jpg".to_string(),
        ]));
    }
}
