//! Moving and copying media files into their canonical location.
//!
//! A relocation resolves the destination through the [`FileNameBuilder`],
//! makes sure the folder chain exists, announces every path it is about to
//! touch to the [`ChangeReporter`], transfers the file and finally rewrites
//! the catalog row. Guard failures (`SameFilename`, `SourceNotFound`,
//! `DestinationRootMissing`) propagate to the caller untouched.

use chrono::{DateTime, Utc};
use curator_model::{DeleteMediaFileReason, LibraryItem, MediaFile};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub mod folders;
pub mod rename;
pub mod transfer;

pub use folders::FolderChain;
pub use rename::{RenamePreview, RenameService};
pub use transfer::{FileTransfer, LocalTransfer, TransferMode};

use crate::attributes::MediaFileAttributes;
use crate::catalog::CatalogStore;
use crate::collaborators::FileNameBuilder;
use crate::config::RelocationConfig;
use crate::error::{MediaError, Result};
use crate::events::{EngineEvent, EventPublisher, publish_or_warn};
use crate::fs::{FileSystem, normalize_path};
use crate::fs_watch::ChangeReporter;

/// Result of a successful relocation.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// The persisted row, now pointing at the destination.
    pub file: MediaFile,
    /// Rows that pointed at the destination before and were removed.
    pub superseded: Vec<MediaFile>,
    /// Mode actually used on disk.
    pub mode: TransferMode,
}

/// Collaborators a [`Relocator`] needs.
#[derive(Clone)]
pub struct RelocatorDeps {
    pub fs: Arc<dyn FileSystem>,
    pub transfer: Arc<dyn FileTransfer>,
    pub catalog: Arc<CatalogStore>,
    pub naming: Arc<dyn FileNameBuilder>,
    pub reporter: Arc<dyn ChangeReporter>,
    pub events: Arc<dyn EventPublisher>,
    pub attributes: MediaFileAttributes,
}

impl fmt::Debug for RelocatorDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocatorDeps")
            .field("catalog", &self.catalog)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

pub struct Relocator {
    deps: RelocatorDeps,
    config: RelocationConfig,
}

impl fmt::Debug for Relocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relocator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Relocator {
    pub fn new(deps: RelocatorDeps, config: RelocationConfig) -> Self {
        Self { deps, config }
    }

    /// Canonical absolute path of `file` inside `item`.
    pub fn destination_for(&self, item: &LibraryItem, file: &MediaFile) -> PathBuf {
        let naming = self.deps.naming.as_ref();
        let name = naming.build_file_name(item, file);
        let extension = file
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        naming.build_file_path(item, &name, &extension)
    }

    pub async fn move_file(&self, file: MediaFile, item: &LibraryItem) -> Result<TransferOutcome> {
        let destination = self.destination_for(item, &file);
        debug!("Moving file: {} to {}", file.path.display(), destination.display());
        self.transfer_file(file, item, destination, TransferMode::Move)
            .await
    }

    /// Copy, or hard link when `copy_using_hardlinks` is on.
    pub async fn copy_file(&self, file: MediaFile, item: &LibraryItem) -> Result<TransferOutcome> {
        let destination = self.destination_for(item, &file);
        let mode = if self.config.copy_using_hardlinks {
            debug!("Hardlinking file: {} to {}", file.path.display(), destination.display());
            TransferMode::HardLinkOrCopy
        } else {
            debug!("Copying file: {} to {}", file.path.display(), destination.display());
            TransferMode::Copy
        };
        self.transfer_file(file, item, destination, mode).await
    }

    async fn transfer_file(
        &self,
        mut file: MediaFile,
        item: &LibraryItem,
        destination: PathBuf,
        mode: TransferMode,
    ) -> Result<TransferOutcome> {
        let fs = self.deps.fs.as_ref();
        let source = file.path.clone();

        if normalize_path(&source) == normalize_path(&destination) {
            return Err(MediaError::SameFilename(source));
        }
        if !fs.file_exists(&source).await {
            return Err(MediaError::SourceNotFound(source));
        }

        let chain = FolderChain::resolve(
            item,
            self.deps.naming.build_sub_folder(item, &file),
            &destination,
        )?;
        let created = chain
            .ensure(
                fs,
                &self.deps.attributes,
                self.deps.reporter.as_ref(),
                item,
                &file,
            )
            .await?;
        if !created.is_empty() {
            publish_or_warn(self.deps.events.as_ref(), EngineEvent::FolderCreated(created)).await;
        }

        self.deps
            .reporter
            .report_change_beginning(&[source.as_path(), destination.as_path()]);
        let used = self
            .deps
            .transfer
            .transfer(&source, &destination, mode)
            .await?;

        self.refresh_file(&mut file, item, &destination).await;
        let superseded = self.supersede(&file, &destination).await?;
        let file = self.deps.catalog.save(file).await?;

        info!(
            "Relocated {} to {} ({})",
            source.display(),
            destination.display(),
            used
        );
        publish_or_warn(
            self.deps.events.as_ref(),
            EngineEvent::FileMoved {
                file: file.clone(),
                old_path: source,
            },
        )
        .await;

        Ok(TransferOutcome {
            file,
            superseded,
            mode: used,
        })
    }

    /// Point the row at `destination` and reapply dates and permissions.
    async fn refresh_file(&self, file: &mut MediaFile, item: &LibraryItem, destination: &Path) {
        let attributes = &self.deps.attributes;

        file.path = destination.to_path_buf();
        file.relative_path = destination
            .strip_prefix(&item.path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| destination.to_path_buf());
        file.item_id = item.id;

        if let Ok(md) = self.deps.fs.metadata(destination).await {
            file.size = md.len;
            if let Some(modified) = md.modified {
                file.modified = DateTime::<Utc>::from(modified);
            }
        }

        if let Some(stamp) = attributes
            .apply_file_date(destination, item, self.config.file_date)
            .await
        {
            file.modified = stamp;
        }
        attributes
            .set_folder_last_write_time(&item.path, file.date_added)
            .await;
        attributes.set_file_permissions(destination).await;
    }

    async fn supersede(&self, file: &MediaFile, destination: &Path) -> Result<Vec<MediaFile>> {
        let catalog = &self.deps.catalog;
        let superseded: Vec<MediaFile> = catalog
            .file_with_path(destination)
            .await?
            .into_iter()
            .filter(|existing| existing.id != file.id)
            .collect();

        if !superseded.is_empty() {
            debug!(
                "Replacing {} catalog rows at {}",
                superseded.len(),
                destination.display()
            );
            catalog
                .delete_many(superseded.clone(), DeleteMediaFileReason::Upgrade)
                .await?;
        }
        Ok(superseded)
    }
}
