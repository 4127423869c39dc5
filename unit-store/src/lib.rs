//! The directory queue between the harvest and publish stages.
//!
//! Harvest builds a unit in a private staging area and [`UnitStore::commit`]s
//! it in one step; publish only ever sees committed units through
//! [`UnitStore::list_pending`] and removes them with [`UnitStore::delete`].

pub mod fs;
pub mod memory;


pub use fs::FsUnitStore;
pub use memory::MemoryUnitStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyrelay_core::{CommentRecord, CoreError, PostRecord, Unit, UnitId};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A unit under construction. Invisible to readers until committed.
#[derive(Debug)]
pub struct StagedUnit {
    unit_id: UnitId,
    created_at: DateTime<Utc>,
    dir: PathBuf,
    pub post: Option<PostRecord>,
    pub summary: Option<String>,
    pub comments: Vec<CommentRecord>,
    pub media: Vec<PathBuf>,
}

impl StagedUnit {
    pub(crate) fn new(unit_id: UnitId, dir: PathBuf) -> Self {
        Self {
            unit_id,
            created_at: Utc::now(),
            dir,
            post: None,
            summary: None,
            comments: Vec::new(),
            media: Vec::new(),
        }
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Overrides the creation timestamp, which decides both the date
    /// directory and the publish order.
    pub fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.created_at = created_at;
    }

    /// Where media for this unit must be downloaded to.
    pub fn media_dir(&self) -> PathBuf {
        self.dir.join(MEDIA_DIR)
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn require_post(&self) -> Result<&PostRecord, CoreError> {
        self.post.as_ref().ok_or_else(|| {
            skyrelay_core::StorageError::CorruptUnit {
                unit_id: self.unit_id.to_string(),
                missing: "post".to_string(),
            }
            .into()
        })
    }
}

pub(crate) const MEDIA_DIR: &str = "media";

#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Opens a private staging area for `unit_id`.
    async fn begin_unit(&self, unit_id: &UnitId) -> Result<StagedUnit, CoreError>;

    /// Makes the staged unit visible in one step.
    ///
    /// Fails with `StorageError::DuplicateUnit` when a unit with the same id is
    /// already pending; the existing unit is left untouched and the staging
    /// area is discarded.
    async fn commit(&self, staged: StagedUnit) -> Result<UnitId, CoreError>;

    /// Discards a staging area without publishing anything.
    async fn abort(&self, staged: StagedUnit) -> Result<(), CoreError>;

    /// Committed units, oldest first.
    async fn list_pending(&self) -> Result<Vec<UnitId>, CoreError>;

    async fn open(&self, unit_id: &UnitId) -> Result<Unit, CoreError>;

    /// Removes a committed unit. Removing an absent unit is not an error.
    async fn delete(&self, unit_id: &UnitId) -> Result<(), CoreError>;

    async fn contains(&self, unit_id: &UnitId) -> Result<bool, CoreError>;

    /// Removes staging areas left behind by crashed or abandoned runs.
    async fn purge_staging(&self) -> Result<usize, CoreError>;

    /// Deletes committed units of `source_name` that carry neither media nor a summary.
    async fn sweep_empty(&self, source_name: &str) -> Result<usize, CoreError> {
        let mut removed = 0;
        for unit_id in self.list_pending().await? {
            if !unit_id.belongs_to(source_name) {
                continue;
            }
            match self.open(&unit_id).await {
                Ok(unit) if unit.is_empty() => {
                    info!("Removing empty unit {}", unit_id);
                    self.delete(&unit_id).await?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => debug!("Sweep skipping unreadable unit {}: {}", unit_id, e),
            }
        }
        Ok(removed)
    }
}
