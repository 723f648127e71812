use chrono::{DateTime, Utc};
use curator_model::{
    DeleteMediaFileReason, FilterFilesType, LibraryItem, LibraryItemId, MediaFile, MediaFileId,
};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::ports::MediaFileRepository;
use crate::error::Result;
use crate::events::{EngineEvent, EventPublisher, publish_or_warn};
use crate::fs::LocalFile;

/// Modified-time tolerance when comparing a disk file with its catalog row.
pub const MODIFIED_TOLERANCE_SECS: i64 = 1;

/// Whether two modification times are equal within the catalog tolerance.
pub fn modified_matches(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_milliseconds().abs() <= MODIFIED_TOLERANCE_SECS * 1_000
}

/// Catalog operations over media-file rows. Mutations that callers observe
/// (additions and deletions) are announced on the event bus.
#[derive(Clone)]
pub struct CatalogStore {
    files: Arc<dyn MediaFileRepository>,
    events: Arc<dyn EventPublisher>,
}

impl fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogStore").finish_non_exhaustive()
    }
}

impl CatalogStore {
    pub fn new(files: Arc<dyn MediaFileRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { files, events }
    }

    pub async fn get(&self, id: MediaFileId) -> Result<Option<MediaFile>> {
        self.files.get(id).await
    }

    pub async fn get_many(&self, ids: &[MediaFileId]) -> Result<Vec<MediaFile>> {
        self.files.get_many(ids).await
    }

    pub async fn files_for_item(&self, item_id: LibraryItemId) -> Result<Vec<MediaFile>> {
        self.files.files_for_item(item_id).await
    }

    pub async fn files_with_base_path(&self, base: &Path) -> Result<Vec<MediaFile>> {
        self.files.files_with_base_path(base).await
    }

    pub async fn file_with_path(&self, path: &Path) -> Result<Option<MediaFile>> {
        self.files.file_with_path(path).await
    }

    pub async fn add(&self, file: MediaFile) -> Result<MediaFile> {
        self.files.insert(&file).await?;
        publish_or_warn(
            self.events.as_ref(),
            EngineEvent::MediaFileAdded { file: file.clone() },
        )
        .await;
        Ok(file)
    }

    pub async fn add_many(&self, files: Vec<MediaFile>) -> Result<Vec<MediaFile>> {
        if files.is_empty() {
            return Ok(files);
        }
        self.files.insert_many(&files).await?;
        for file in &files {
            publish_or_warn(
                self.events.as_ref(),
                EngineEvent::MediaFileAdded { file: file.clone() },
            )
            .await;
        }
        Ok(files)
    }

    pub async fn update(&self, file: &MediaFile) -> Result<()> {
        self.files.update(file).await
    }

    pub async fn update_many(&self, files: &[MediaFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        self.files.update_many(files).await
    }

    /// Update the row if it is catalogued, insert it otherwise.
    pub async fn save(&self, file: MediaFile) -> Result<MediaFile> {
        if self.files.get(file.id).await?.is_some() {
            self.files.update(&file).await?;
            Ok(file)
        } else {
            self.add(file).await
        }
    }

    pub async fn delete(&self, file: MediaFile, reason: DeleteMediaFileReason) -> Result<()> {
        self.files.delete(file.id).await?;
        debug!("Deleted media file {} ({})", file.path.display(), reason);
        publish_or_warn(
            self.events.as_ref(),
            EngineEvent::MediaFileDeleted { file, reason },
        )
        .await;
        Ok(())
    }

    pub async fn delete_many(
        &self,
        files: Vec<MediaFile>,
        reason: DeleteMediaFileReason,
    ) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let ids: Vec<MediaFileId> = files.iter().map(|file| file.id).collect();
        self.files.delete_many(&ids).await?;
        for file in files {
            publish_or_warn(
                self.events.as_ref(),
                EngineEvent::MediaFileDeleted { file, reason },
            )
            .await;
        }
        Ok(())
    }

    /// Drop on-disk files the catalog already knows unchanged, so a rescan
    /// only examines new or modified files.
    pub async fn filter_unchanged(
        &self,
        files: Vec<LocalFile>,
        item: &LibraryItem,
        filter: FilterFilesType,
    ) -> Result<Vec<LocalFile>> {
        if filter == FilterFilesType::None {
            return Ok(files);
        }

        let known: HashMap<PathBuf, MediaFile> = self
            .files
            .files_with_base_path(&item.path)
            .await?
            .into_iter()
            .map(|file| (file.path.clone(), file))
            .collect();

        let before = files.len();
        let remaining: Vec<LocalFile> = files
            .into_iter()
            .filter(|local| match known.get(&local.path) {
                Some(row) => {
                    let unchanged =
                        row.size == local.size && modified_matches(row.modified, local.modified);
                    let skip = match filter {
                        FilterFilesType::Matched => unchanged && row.matched,
                        _ => unchanged,
                    };
                    !skip
                }
                None => true,
            })
            .collect();

        debug!(
            "Skipping {} unchanged files for {}",
            before - remaining.len(),
            item
        );
        Ok(remaining)
    }
}
