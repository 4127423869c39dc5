//! In-memory backing. Media still land on disk, in a scratch directory.

use crate::{StagedUnit, UnitStore, MEDIA_DIR};
use async_trait::async_trait;
use skyrelay_core::{CoreError, StorageError, Unit, UnitId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;

#[derive(Debug)]
pub struct MemoryUnitStore {
    scratch: PathBuf,
    units: Mutex<HashMap<UnitId, Unit>>,
}

impl MemoryUnitStore {
    pub fn new(scratch: impl Into<PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
            units: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UnitId, Unit>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.units.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UnitStore for MemoryUnitStore {
    async fn begin_unit(&self, unit_id: &UnitId) -> Result<StagedUnit, CoreError> {
        let dir = self.scratch.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(dir.join(MEDIA_DIR)).await?;
        Ok(StagedUnit::new(unit_id.clone(), dir))
    }

    async fn commit(&self, staged: StagedUnit) -> Result<UnitId, CoreError> {
        let unit_id = staged.unit_id().clone();
        let unit = {
            let post = staged.require_post()?;
            Unit {
                unit_id: unit_id.clone(),
                created_at: staged.created_at(),
                title: post.title.clone(),
                source_url: post.body_url.clone(),
                summary: staged.summary.clone(),
                comments: staged.comments.clone(),
                media: staged.media.clone(),
            }
        };

        let inserted = {
            let mut units = self.lock();
            if units.contains_key(&unit_id) {
                false
            } else {
                units.insert(unit_id.clone(), unit);
                true
            }
        };

        if inserted {
            Ok(unit_id)
        } else {
            self.abort(staged).await?;
            Err(StorageError::DuplicateUnit {
                unit_id: unit_id.to_string(),
            }
            .into())
        }
    }

    async fn abort(&self, staged: StagedUnit) -> Result<(), CoreError> {
        match fs::remove_dir_all(staged.dir()).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn list_pending(&self) -> Result<Vec<UnitId>, CoreError> {
        let mut pending: Vec<(chrono::DateTime<chrono::Utc>, UnitId)> = self
            .lock()
            .values()
            .map(|u| (u.created_at, u.unit_id.clone()))
            .collect();
        pending.sort();
        Ok(pending.into_iter().map(|(_, id)| id).collect())
    }

    async fn open(&self, unit_id: &UnitId) -> Result<Unit, CoreError> {
        self.lock().get(unit_id).cloned().ok_or_else(|| {
            StorageError::UnitNotFound {
                unit_id: unit_id.to_string(),
            }
            .into()
        })
    }

    async fn delete(&self, unit_id: &UnitId) -> Result<(), CoreError> {
        self.lock().remove(unit_id);
        Ok(())
    }

    async fn contains(&self, unit_id: &UnitId) -> Result<bool, CoreError> {
        Ok(self.lock().contains_key(unit_id))
    }

    async fn purge_staging(&self) -> Result<usize, CoreError> {
        // Committed media also live under the scratch directory, so nothing is safe to purge.
        Ok(0)
    }
}
