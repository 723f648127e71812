//! Catalog clean-up against the current disk listing of one library item.
//!
//! Any catalog row whose path is absent from the listing is deleted with
//! reason `MissingFromDisk`. A failure on one row is logged and the pass
//! continues with the rest. Running the pass twice over the same listing
//! deletes nothing the second time.

use curator_model::{DeleteMediaFileReason, LibraryItem, MediaFileId};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::fs::normalize_path;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub deleted: Vec<MediaFileId>,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    catalog: Arc<CatalogStore>,
}

impl Reconciler {
    pub fn new(catalog: Arc<CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Delete catalog rows of `item` whose file is not in `paths_on_disk`.
    /// Paths compare after lexical normalisation.
    pub async fn reconcile(
        &self,
        item: &LibraryItem,
        paths_on_disk: &[PathBuf],
    ) -> Result<ReconcileReport> {
        let on_disk: HashSet<PathBuf> = paths_on_disk
            .iter()
            .map(|path| normalize_path(path))
            .collect();

        let files = self.catalog.files_for_item(item.id).await?;
        let mut report = ReconcileReport {
            examined: files.len(),
            ..ReconcileReport::default()
        };

        for file in files {
            if on_disk.contains(&normalize_path(&file.path)) {
                continue;
            }

            let id = file.id;
            let path = file.path.clone();
            debug!("File [{}] no longer exists on disk, removing from db", path.display());
            match self
                .catalog
                .delete(file, DeleteMediaFileReason::MissingFromDisk)
                .await
            {
                Ok(()) => report.deleted.push(id),
                Err(err) => {
                    report.failed += 1;
                    error!(
                        error = %err,
                        "Unable to cleanup media file {} in DB",
                        path.display()
                    );
                }
            }
        }

        if !report.deleted.is_empty() {
            info!(
                "Removed {} missing media files for {}",
                report.deleted.len(),
                item
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryMediaFileRepository, MediaFileRepository};
    use crate::events::InProcEventBus;
    use async_trait::async_trait;
    use chrono::Utc;
    use crate::error::MediaError;
    use curator_model::{ItemKind, LibraryItemId, MediaFile};
    use std::path::Path;

    fn item() -> LibraryItem {
        LibraryItem::new(ItemKind::Artist, "Artist", "/media/music/Artist")
    }

    fn row(item: &LibraryItem, name: &str) -> MediaFile {
        MediaFile::new(item.id, &item.path, item.path.join(name), 10, Utc::now())
    }

    async fn reconciler_with(rows: &[MediaFile]) -> (Reconciler, Arc<InMemoryMediaFileRepository>) {
        let repo = Arc::new(InMemoryMediaFileRepository::new());
        repo.insert_many(rows).await.unwrap();
        let store = Arc::new(CatalogStore::new(
            repo.clone(),
            Arc::new(InProcEventBus::default()),
        ));
        (Reconciler::new(store), repo)
    }

    #[tokio::test]
    async fn deletes_rows_missing_from_disk_and_is_idempotent() {
        let item = item();
        let keep = row(&item, "Album/01.flac");
        let gone = row(&item, "Album/02.flac");
        let (reconciler, repo) = reconciler_with(&[keep.clone(), gone.clone()]).await;

        let listing = vec![keep.path.clone()];
        let first = reconciler.reconcile(&item, &listing).await.unwrap();
        assert_eq!(first.examined, 2);
        assert_eq!(first.deleted, vec![gone.id]);

        let second = reconciler.reconcile(&item, &listing).await.unwrap();
        assert_eq!(second.examined, 1);
        assert!(second.deleted.is_empty());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn listing_paths_are_normalised_before_comparison() {
        let item = item();
        let keep = row(&item, "Album/01.flac");
        let (reconciler, _) = reconciler_with(&[keep]).await;

        let listing = vec![PathBuf::from("/media/music/Artist/./Album/01.flac")];
        let report = reconciler.reconcile(&item, &listing).await.unwrap();
        assert!(report.deleted.is_empty());
    }

    /// Fails deletes for one path so the pass has to carry on.
    struct FlakyRepo {
        inner: InMemoryMediaFileRepository,
        poisoned: PathBuf,
    }

    #[async_trait]
    impl MediaFileRepository for FlakyRepo {
        async fn insert(&self, file: &MediaFile) -> Result<()> {
            self.inner.insert(file).await
        }
        async fn insert_many(&self, files: &[MediaFile]) -> Result<()> {
            self.inner.insert_many(files).await
        }
        async fn update(&self, file: &MediaFile) -> Result<()> {
            self.inner.update(file).await
        }
        async fn update_many(&self, files: &[MediaFile]) -> Result<()> {
            self.inner.update_many(files).await
        }
        async fn delete(&self, id: MediaFileId) -> Result<()> {
            if let Some(file) = self.inner.get(id).await?
                && file.path == self.poisoned
            {
                return Err(MediaError::Internal("row is locked".into()));
            }
            self.inner.delete(id).await
        }
        async fn delete_many(&self, ids: &[MediaFileId]) -> Result<()> {
            self.inner.delete_many(ids).await
        }
        async fn get(&self, id: MediaFileId) -> Result<Option<MediaFile>> {
            self.inner.get(id).await
        }
        async fn get_many(&self, ids: &[MediaFileId]) -> Result<Vec<MediaFile>> {
            self.inner.get_many(ids).await
        }
        async fn files_for_item(&self, item_id: LibraryItemId) -> Result<Vec<MediaFile>> {
            self.inner.files_for_item(item_id).await
        }
        async fn files_with_base_path(&self, base: &Path) -> Result<Vec<MediaFile>> {
            self.inner.files_with_base_path(base).await
        }
        async fn file_with_path(&self, path: &Path) -> Result<Option<MediaFile>> {
            self.inner.file_with_path(path).await
        }
    }

    #[tokio::test]
    async fn a_failed_delete_does_not_abort_the_pass() {
        let item = item();
        let stuck = row(&item, "Album/01.flac");
        let gone = row(&item, "Album/02.flac");
        let repo = FlakyRepo {
            inner: InMemoryMediaFileRepository::new(),
            poisoned: stuck.path.clone(),
        };
        repo.insert_many(&[stuck, gone.clone()]).await.unwrap();
        let store = Arc::new(CatalogStore::new(
            Arc::new(repo),
            Arc::new(InProcEventBus::default()),
        ));

        let report = Reconciler::new(store).reconcile(&item, &[]).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, vec![gone.id]);
    }
}
