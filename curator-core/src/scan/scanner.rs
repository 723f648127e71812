use curator_model::{
    FilterFilesType, LibraryItem, MediaFile, ScanOutcome, ScanSkippedReason,
};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::path_filter::PathFilter;
use super::reconciler::Reconciler;
use crate::attributes::MediaFileAttributes;
use crate::catalog::{CatalogStore, RootFolderRepository, best_root_folder_path, modified_matches};
use crate::collaborators::{ImportDecision, ImportDecisionMaker, Importer};
use crate::config::LibraryConfig;
use crate::error::Result;
use crate::events::{EngineEvent, EventPublisher, publish_or_warn};
use crate::fs::{
    FileSystem, create_folder_all, list_directories, list_files_recursive,
    remove_empty_subfolders,
};

/// Collaborators a [`Scanner`] needs.
#[derive(Clone)]
pub struct ScannerDeps {
    pub fs: Arc<dyn FileSystem>,
    pub catalog: Arc<CatalogStore>,
    pub roots: Arc<dyn RootFolderRepository>,
    pub decisions: Arc<dyn ImportDecisionMaker>,
    pub importer: Arc<dyn Importer>,
    pub events: Arc<dyn EventPublisher>,
    pub attributes: MediaFileAttributes,
}

impl fmt::Debug for ScannerDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerDeps")
            .field("catalog", &self.catalog)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Runs a full scan of one library item: folder validation, listing,
/// catalog reconciliation, the import pipeline and empty-folder cleanup.
pub struct Scanner {
    deps: ScannerDeps,
    reconciler: Reconciler,
    filter: PathFilter,
    config: LibraryConfig,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("filter", &self.filter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Rows written back after the import pipeline ran.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CatalogSync {
    inserted: usize,
    updated: usize,
}

impl Scanner {
    pub fn new(deps: ScannerDeps, config: LibraryConfig) -> Self {
        let reconciler = Reconciler::new(deps.catalog.clone());
        let filter = PathFilter::new(&config.media_extensions);
        Self {
            deps,
            reconciler,
            filter,
            config,
        }
    }

    pub fn path_filter(&self) -> &PathFilter {
        &self.filter
    }

    pub async fn scan(&self, item: &LibraryItem, filter: FilterFilesType) -> Result<ScanOutcome> {
        let fs = self.deps.fs.as_ref();
        let roots = self.deps.roots.all().await?;
        let root = best_root_folder_path(&roots, &item.path);

        if !fs.folder_exists(&root).await {
            warn!("{}'s root folder ({}) doesn't exist.", item, root.display());
            return Ok(self.skip(item, ScanSkippedReason::RootFolderMissing).await);
        }

        if list_directories(fs, &root).await?.is_empty() {
            warn!("{}'s root folder ({}) is empty.", item, root.display());
            return Ok(self.skip(item, ScanSkippedReason::RootFolderEmpty).await);
        }

        info!("Scanning {}", item);

        if !fs.folder_exists(&item.path).await {
            self.reconciler.reconcile(item, &[]).await?;

            if self.config.create_empty_item_folders {
                debug!("Creating missing item folder: {}", item.path.display());
                for created in create_folder_all(fs, &item.path).await? {
                    self.deps.attributes.set_folder_permissions(&created).await;
                }
            } else {
                debug!("Item folder doesn't exist: {}", item.path.display());
            }
            return Ok(self.skip(item, ScanSkippedReason::ItemFolderMissing).await);
        }

        let listing_started = Instant::now();
        let on_disk = list_files_recursive(fs, &item.path).await?;
        let found = on_disk.len();
        let files = self.filter.filter_files(&item.path, on_disk);
        trace!(
            "Finished getting media files for: {} [{:?}]",
            item,
            listing_started.elapsed()
        );
        debug!(
            "{} media files were found in {} ({} entries on disk)",
            files.len(),
            item.path.display(),
            found
        );

        let paths: Vec<PathBuf> = files.iter().map(|file| file.path.clone()).collect();
        debug!("{} Cleaning up media files in DB", item);
        self.reconciler.reconcile(item, &paths).await?;

        let decisions_started = Instant::now();
        let candidates = self
            .deps
            .catalog
            .filter_unchanged(files, item, filter)
            .await?;
        let decisions = self.deps.decisions.decide(candidates, item, filter).await?;
        debug!(
            "Import decisions complete for: {} [{:?}]",
            item,
            decisions_started.elapsed()
        );

        let results = self.deps.importer.import(&decisions, item).await?;
        let imported = results.iter().filter(|result| result.imported).count();

        let sync = self.sync_catalog(item, &decisions).await?;
        debug!(
            "Imported {} files, inserted {} new unmatched files, updated {} known files",
            imported, sync.inserted, sync.updated
        );

        if self.config.delete_empty_folders {
            self.remove_empty_item_folder(&item.path).await;
        }

        info!("Completed scanning disk for {}", item);
        publish_or_warn(
            self.deps.events.as_ref(),
            EngineEvent::Scanned { item_id: item.id },
        )
        .await;
        Ok(ScanOutcome::Scanned)
    }

    async fn skip(&self, item: &LibraryItem, reason: ScanSkippedReason) -> ScanOutcome {
        publish_or_warn(
            self.deps.events.as_ref(),
            EngineEvent::ScanSkipped {
                item_id: item.id,
                reason,
            },
        )
        .await;
        ScanOutcome::Skipped(reason)
    }

    /// Decisions may have been narrowed to new or changed files; anything
    /// the importer took is already catalogued. Insert rows for the rest and
    /// refresh size and timestamps of known rows that drifted.
    async fn sync_catalog(
        &self,
        item: &LibraryItem,
        decisions: &[ImportDecision],
    ) -> Result<CatalogSync> {
        let catalog = &self.deps.catalog;
        let mut known: HashMap<PathBuf, MediaFile> = catalog
            .files_with_base_path(&item.path)
            .await?
            .into_iter()
            .map(|file| (file.path.clone(), file))
            .collect();

        let mut new_files = Vec::new();
        let mut updated_files = Vec::new();

        for decision in decisions {
            let local = &decision.local;
            match known.remove(&local.path) {
                None => {
                    let mut file = MediaFile::new(
                        item.id,
                        &item.path,
                        local.path.clone(),
                        local.size,
                        local.modified,
                    );
                    file.quality = decision.quality.clone();
                    file.media_info = decision.media_info.clone();
                    file.scene_name = decision.scene_name.clone();
                    file.release_group = decision.release_group.clone();
                    new_files.push(file);
                }
                Some(mut file) => {
                    if file.size == local.size && modified_matches(file.modified, local.modified) {
                        continue;
                    }
                    file.size = local.size;
                    file.modified = local.modified;
                    file.quality = decision.quality.clone();
                    if decision.media_info.is_some() {
                        file.media_info = decision.media_info.clone();
                    }
                    updated_files.push(file);
                }
            }
        }

        let sync = CatalogSync {
            inserted: new_files.len(),
            updated: updated_files.len(),
        };
        catalog.add_many(new_files).await?;
        catalog.update_many(&updated_files).await?;
        Ok(sync)
    }

    async fn remove_empty_item_folder(&self, path: &Path) {
        let fs = self.deps.fs.as_ref();
        let result = match list_files_recursive(fs, path).await {
            Ok(files) if files.is_empty() => {
                info!("Removing empty item folder: {}", path.display());
                fs.delete_folder(path, true).await
            }
            Ok(_) => remove_empty_subfolders(fs, path).await.map(|removed| {
                if !removed.is_empty() {
                    debug!("Removed {} empty sub-folders of {}", removed.len(), path.display());
                }
            }),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            warn!(error = %err, "Unable to remove empty folders in {}", path.display());
        }
    }
}
