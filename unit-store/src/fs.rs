//! Filesystem backing: one directory per unit under a date directory.
//!
//! ```text
//! {root}/{YYYY-MM-DD}/{source}_{post_id}/
//!     post_info.txt  title.txt  url.txt  post-summary.txt  comments.txt
//!     unit.json      media/
//! {root}/.staging/{uuid}/
//! ```

use crate::{StagedUnit, UnitStore, MEDIA_DIR};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use skyrelay_core::{CommentRecord, CoreError, PostRecord, StorageError, Unit, UnitId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const STAGING_DIR: &str = ".staging";
/// A concurrent `delete` may remove the date directory between creating it
/// and renaming into it.
const COMMIT_ATTEMPTS: usize = 5;
const DATE_FORMAT: &str = "%Y-%m-%d";

const POST_INFO_FILE: &str = "post_info.txt";
const TITLE_FILE: &str = "title.txt";
const URL_FILE: &str = "url.txt";
const SUMMARY_FILE: &str = "post-summary.txt";
const COMMENTS_FILE: &str = "comments.txt";
const MANIFEST_FILE: &str = "unit.json";

/// Machine-readable companion of the text artifacts.
#[derive(Debug, Serialize, Deserialize)]
struct UnitManifest {
    unit_id: UnitId,
    created_at: DateTime<Utc>,
    post: PostRecord,
    comments: Vec<CommentRecord>,
}

#[derive(Debug, Clone)]
pub struct FsUnitStore {
    root: PathBuf,
}

impl FsUnitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Date directories in ascending order.
    async fn date_dirs(&self) -> Result<Vec<PathBuf>, CoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if NaiveDate::parse_from_str(name, DATE_FORMAT).is_ok() && is_dir(&entry).await? {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Finds the committed directory of a unit, whatever day it was created on.
    async fn locate(&self, unit_id: &UnitId) -> Result<Option<PathBuf>, CoreError> {
        let name = unit_id.to_string();
        for date_dir in self.date_dirs().await? {
            let candidate = date_dir.join(&name);
            if fs::try_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// `None` when the unit disappeared while it was being read.
    async fn created_at(&self, unit_dir: &Path) -> Result<Option<DateTime<Utc>>, CoreError> {
        match read_manifest(unit_dir).await {
            Ok(manifest) => Ok(Some(manifest.created_at)),
            Err(_) => {
                // Corrupt units still enumerate so publish can report them.
                let metadata = match fs::metadata(unit_dir).await {
                    Ok(metadata) => metadata,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                Ok(Some(DateTime::<Utc>::from(metadata.modified()?)))
            }
        }
    }

    /// Moves a staging directory into its date directory.
    async fn place(&self, staging_dir: &Path, date_dir: &Path, target: &Path) -> std::io::Result<()> {
        let mut attempt = 1;
        loop {
            fs::create_dir_all(date_dir).await?;
            let result = fs::rename(staging_dir, target).await;
            let date_dir_vanished = match &result {
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < COMMIT_ATTEMPTS => {
                    fs::try_exists(staging_dir).await.unwrap_or(false)
                }
                _ => false,
            };
            if !date_dir_vanished {
                return result;
            }
            debug!("Date directory {} vanished, retrying", date_dir.display());
            attempt += 1;
        }
    }

    async fn write_artifacts(&self, staged: &StagedUnit) -> Result<(), CoreError> {
        let post = staged.require_post()?;
        let dir = staged.dir();

        fs::write(dir.join(POST_INFO_FILE), render_post_info(post)).await?;
        fs::write(dir.join(TITLE_FILE), &post.title).await?;
        fs::write(dir.join(URL_FILE), &post.body_url).await?;
        if let Some(summary) = &staged.summary {
            fs::write(dir.join(SUMMARY_FILE), summary).await?;
        }
        if !staged.comments.is_empty() {
            fs::write(dir.join(COMMENTS_FILE), render_comments(&staged.comments)).await?;
        }

        let manifest = UnitManifest {
            unit_id: staged.unit_id().clone(),
            created_at: staged.created_at(),
            post: post.clone(),
            comments: staged.comments.clone(),
        };
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?).await?;
        Ok(())
    }
}

#[async_trait]
impl UnitStore for FsUnitStore {
    async fn begin_unit(&self, unit_id: &UnitId) -> Result<StagedUnit, CoreError> {
        let dir = self.staging_root().join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(dir.join(MEDIA_DIR)).await.map_err(|e| {
            warn!("Cannot create staging area {}: {}", dir.display(), e);
            StorageError::StagingUnavailable {
                path: dir.display().to_string(),
            }
        })?;
        debug!("Staging {} in {}", unit_id, dir.display());
        Ok(StagedUnit::new(unit_id.clone(), dir))
    }

    async fn commit(&self, staged: StagedUnit) -> Result<UnitId, CoreError> {
        let unit_id = staged.unit_id().clone();
        let duplicate = || StorageError::DuplicateUnit {
            unit_id: unit_id.to_string(),
        };

        if self.locate(&unit_id).await?.is_some() {
            self.abort(staged).await?;
            return Err(duplicate().into());
        }

        if let Err(e) = self.write_artifacts(&staged).await {
            self.abort(staged).await?;
            return Err(e);
        }

        let date_dir = self
            .root
            .join(staged.created_at().format(DATE_FORMAT).to_string());
        let target = date_dir.join(unit_id.to_string());
        let staging_dir = staged.dir().to_path_buf();

        match self.place(&staging_dir, &date_dir, &target).await {
            Ok(()) => {
                info!("Committed unit {} at {}", unit_id, target.display());
                Ok(unit_id)
            }
            Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::DirectoryNotEmpty) => {
                self.abort(staged).await?;
                Err(duplicate().into())
            }
            Err(e) => {
                self.abort(staged).await?;
                Err(e.into())
            }
        }
    }

    async fn abort(&self, staged: StagedUnit) -> Result<(), CoreError> {
        match fs::remove_dir_all(staged.dir()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pending(&self) -> Result<Vec<UnitId>, CoreError> {
        let mut pending = Vec::new();
        for date_dir in self.date_dirs().await? {
            // Units and emptied date directories may be deleted concurrently.
            let mut entries = match fs::read_dir(&date_dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                if !is_dir(&entry).await? {
                    continue;
                }
                let name = entry.file_name();
                let Some(unit_id) = name.to_str().and_then(UnitId::parse) else {
                    debug!("Ignoring unexpected entry {}", entry.path().display());
                    continue;
                };
                match self.created_at(&entry.path()).await? {
                    Some(created_at) => pending.push((created_at, unit_id)),
                    None => debug!("Unit {} vanished during listing", unit_id),
                }
            }
        }
        pending.sort();
        Ok(pending.into_iter().map(|(_, id)| id).collect())
    }

    async fn open(&self, unit_id: &UnitId) -> Result<Unit, CoreError> {
        let dir = self
            .locate(unit_id)
            .await?
            .ok_or_else(|| StorageError::UnitNotFound {
                unit_id: unit_id.to_string(),
            })?;
        let corrupt = |missing: &str| StorageError::CorruptUnit {
            unit_id: unit_id.to_string(),
            missing: missing.to_string(),
        };

        let manifest = read_manifest(&dir).await.map_err(|_| corrupt(MANIFEST_FILE))?;
        let title = read_optional(&dir.join(TITLE_FILE))
            .await?
            .ok_or_else(|| corrupt(TITLE_FILE))?;
        let source_url = read_optional(&dir.join(URL_FILE))
            .await?
            .ok_or_else(|| corrupt(URL_FILE))?;
        let summary = read_optional(&dir.join(SUMMARY_FILE))
            .await?
            .filter(|s| !s.trim().is_empty());

        Ok(Unit {
            unit_id: unit_id.clone(),
            created_at: manifest.created_at,
            title,
            source_url,
            summary,
            comments: manifest.comments,
            media: list_media(&dir.join(MEDIA_DIR)).await?,
        })
    }

    async fn delete(&self, unit_id: &UnitId) -> Result<(), CoreError> {
        let Some(dir) = self.locate(unit_id).await? else {
            debug!("Unit {} already gone", unit_id);
            return Ok(());
        };
        match fs::remove_dir_all(&dir).await {
            Ok(()) => info!("Deleted unit {}", unit_id),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(date_dir) = dir.parent() {
            // Only succeeds once the date directory is empty.
            let _ = fs::remove_dir(date_dir).await;
        }
        Ok(())
    }

    async fn contains(&self, unit_id: &UnitId) -> Result<bool, CoreError> {
        Ok(self.locate(unit_id).await?.is_some())
    }

    async fn purge_staging(&self) -> Result<usize, CoreError> {
        let staging = self.staging_root();
        let mut entries = match fs::read_dir(&staging).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let removed = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match removed {
                Ok(()) => purged += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if purged > 0 {
            warn!("Purged {} stale staging entries", purged);
        }
        Ok(purged)
    }
}

/// False for entries removed since the directory was read.
async fn is_dir(entry: &fs::DirEntry) -> Result<bool, CoreError> {
    match entry.file_type().await {
        Ok(file_type) => Ok(file_type.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn read_manifest(unit_dir: &Path) -> Result<UnitManifest, CoreError> {
    let bytes = fs::read(unit_dir.join(MANIFEST_FILE)).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_optional(path: &Path) -> Result<Option<String>, CoreError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_media(media_dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut entries = match fs::read_dir(media_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn render_post_info(post: &PostRecord) -> String {
    let mut out = format!(
        "Title: {}\nAuthor: {}\nCreated: {}\nScore: {}\nURL: {}\n\n",
        post.title,
        post.author,
        post.created_at.format("%Y-%m-%d %H:%M:%S"),
        post.score,
        post.body_url
    );
    if let Some(body) = post.selftext.as_deref().filter(|b| !b.is_empty()) {
        out.push_str("Content:\n");
        out.push_str(body);
    }
    out
}

fn render_comments(comments: &[CommentRecord]) -> String {
    let rule = "-".repeat(80);
    comments
        .iter()
        .map(|c| {
            format!(
                "Author: {}\nCreated: {}\nScore: {}\nContent:\n{}\n\n{}\n\n",
                c.author,
                c.created_at.format("%Y-%m-%d %H:%M:%S"),
                c.score,
                c.body,
                rule
            )
        })
        .collect()
}
