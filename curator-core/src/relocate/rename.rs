use curator_model::{LibraryItem, MediaFile, MediaFileId};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::Relocator;
use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::events::{EngineEvent, EventPublisher, publish_or_warn};
use crate::fs::normalize_path;

/// A catalogued file whose current path differs from its canonical one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePreview {
    pub file_id: MediaFileId,
    pub existing_path: PathBuf,
    pub new_path: PathBuf,
}

/// Batch renames on top of the [`Relocator`]. One file failing never stops
/// the batch.
pub struct RenameService {
    relocator: Arc<Relocator>,
    catalog: Arc<CatalogStore>,
    events: Arc<dyn EventPublisher>,
}

impl fmt::Debug for RenameService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenameService")
            .field("relocator", &self.relocator)
            .finish_non_exhaustive()
    }
}

impl RenameService {
    pub fn new(
        relocator: Arc<Relocator>,
        catalog: Arc<CatalogStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            relocator,
            catalog,
            events,
        }
    }

    pub async fn previews(&self, item: &LibraryItem) -> Result<Vec<RenamePreview>> {
        let files = self.catalog.files_for_item(item.id).await?;
        let mut previews: Vec<RenamePreview> = files
            .iter()
            .filter_map(|file| {
                let existing_path = item.path.join(&file.relative_path);
                let new_path = self.relocator.destination_for(item, file);
                (normalize_path(&existing_path) != normalize_path(&new_path)).then(|| {
                    RenamePreview {
                        file_id: file.id,
                        existing_path,
                        new_path,
                    }
                })
            })
            .collect();
        previews.sort_by(|a, b| a.existing_path.cmp(&b.existing_path));
        Ok(previews)
    }

    /// Move each file to its canonical path. Returns the renamed rows.
    pub async fn rename_files(&self, item: &LibraryItem, files: Vec<MediaFile>) -> Vec<MediaFile> {
        let mut renamed = Vec::new();

        for mut file in files {
            let old_path = item.path.join(&file.relative_path);
            file.path = old_path.clone();

            debug!("Renaming file: {}", file);
            match self.relocator.move_file(file, item).await {
                Ok(outcome) => {
                    debug!("Renamed file: {}", outcome.file);
                    renamed.push(outcome.file);
                }
                Err(err) if err.is_same_filename() => {
                    debug!(
                        "File not renamed, source and destination are the same: {}",
                        old_path.display()
                    );
                }
                Err(err) => {
                    error!(error = %err, "Failed to rename file: {}", old_path.display());
                }
            }
        }

        if !renamed.is_empty() {
            publish_or_warn(
                self.events.as_ref(),
                EngineEvent::ItemRenamed { item_id: item.id },
            )
            .await;
        }
        renamed
    }

    /// Rename every catalogued file of `item`.
    pub async fn rename_item(&self, item: &LibraryItem) -> Result<Vec<MediaFile>> {
        let files = self.catalog.files_for_item(item.id).await?;
        info!("Renaming {} files for {}", files.len(), item);
        let renamed = self.rename_files(item, files).await;
        info!("All files renamed for {}", item);
        Ok(renamed)
    }
}
