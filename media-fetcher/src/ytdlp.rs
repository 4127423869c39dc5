//! Hosted-video downloads through the `yt-dlp` executable.

use skyrelay_core::{CoreError, MediaFetchError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const YT_DLP: &str = "yt-dlp";
const STDERR_TAIL_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    max_bytes: Option<u64>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(YT_DLP)
    }
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            max_bytes: None,
        }
    }

    /// Caps the size of a downloaded file.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    fn tool_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Downloads the best available format to `{dest_dir}/{stem}.{ext}`, the
    /// extension being whatever the extractor picked.
    pub async fn download(&self, url: &str, dest_dir: &Path, stem: &str) -> Result<PathBuf, CoreError> {
        let template = dest_dir.join(format!("{}.%(ext)s", stem));
        debug!("Running {} for {}", self.tool_name(), url);

        let mut command = Command::new(&self.program);
        command.arg("-f").arg("best");
        if let Some(max_bytes) = self.max_bytes {
            command.arg("--max-filesize").arg(max_bytes.to_string());
        }
        let output = command
            .arg("-o")
            .arg(&template)
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    CoreError::from(MediaFetchError::ToolUnavailable {
                        tool: self.tool_name(),
                    })
                }
                _ => CoreError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = {
                let chars: Vec<char> = stderr.trim().chars().collect();
                chars[chars.len().saturating_sub(STDERR_TAIL_CHARS)..]
                    .iter()
                    .collect()
            };
            return Err(MediaFetchError::ToolFailed {
                tool: self.tool_name(),
                reason: format!("{}: {}", output.status, tail),
            }
            .into());
        }

        let path = find_output(dest_dir, stem).await?.ok_or_else(|| MediaFetchError::ToolFailed {
            tool: self.tool_name(),
            reason: format!("no output file for {}", url),
        })?;

        // yt-dlp only enforces the cap when the size is known up front.
        let size = fs::metadata(&path).await?.len();
        if let Some(limit) = self.max_bytes.filter(|limit| size > *limit) {
            warn!("{} is {} bytes, over the {} byte cap", path.display(), size, limit);
            let _ = fs::remove_file(&path).await;
            return Err(MediaFetchError::TooLarge { size, limit }.into());
        }

        info!("Downloaded {} with {}", path.display(), self.tool_name());
        Ok(path)
    }
}

/// The finished file written for `stem`, ignoring partial downloads.
async fn find_output(dest_dir: &Path, stem: &str) -> Result<Option<PathBuf>, CoreError> {
    let prefix = format!("{}.", stem);
    let mut entries = fs::read_dir(dest_dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyrelay_core::ErrorExt;

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = YtDlp::new(dir.path().join("no-such-yt-dlp"));

        let err = tool
            .download("https://youtu.be/abc", dir.path(), "post")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::MediaFetch(MediaFetchError::ToolUnavailable { .. })
        ));
        assert!(!err.is_retryable());
    }

    /// Writes a stand-in for yt-dlp that produces `bytes` bytes of output and
    /// fails unless it was given `--max-filesize`.
    #[cfg(unix)]
    fn fake_tool(dir: &Path, bytes: usize) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            "#!/bin/sh\n\
             case \"$*\" in *--max-filesize*) ;; *) exit 3 ;; esac\n\
             out=\"\"\n\
             while [ $# -gt 0 ]; do [ \"$1\" = \"-o\" ] && out=\"$2\"; shift; done\n\
             out=$(printf '%s' \"$out\" | sed 's/%(ext)s/mp4/')\n\
             head -c {} /dev/zero > \"$out\"\n",
            bytes
        );
        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_oversized_video_is_removed() {
        let tools = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let tool = YtDlp::new(fake_tool(tools.path(), 2048)).with_max_bytes(1024);

        let err = tool
            .download("https://youtu.be/abc", dest.path(), "post")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::MediaFetch(MediaFetchError::TooLarge {
                size: 2048,
                limit: 1024
            })
        ));
        assert!(!dest.path().join("post.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_video_within_cap_is_kept() {
        let tools = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let tool = YtDlp::new(fake_tool(tools.path(), 512)).with_max_bytes(1024);

        let saved = tool
            .download("https://youtu.be/abc", dest.path(), "post")
            .await
            .unwrap();
        assert_eq!(saved, dest.path().join("post.mp4"));
        assert_eq!(std::fs::metadata(&saved).unwrap().len(), 512);
    }

    #[tokio::test]
    async fn test_find_output_skips_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc.mp4.part"), b"x").await.unwrap();
        fs::write(dir.path().join("abc_1.mp4"), b"x").await.unwrap();
        assert!(find_output(dir.path(), "abc").await.unwrap().is_none());

        fs::write(dir.path().join("abc.webm"), b"x").await.unwrap();
        let found = find_output(dir.path(), "abc").await.unwrap().unwrap();
        assert!(found.ends_with("abc.webm"));
    }
}
