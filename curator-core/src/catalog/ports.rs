use async_trait::async_trait;
use curator_model::{LibraryItem, LibraryItemId, MediaFile, MediaFileId, RootFolder, RootFolderId};
use std::path::Path;

use crate::error::Result;

/// Persistence for catalogued media files. `path` is unique across rows.
#[async_trait]
pub trait MediaFileRepository: Send + Sync {
    async fn insert(&self, file: &MediaFile) -> Result<()>;

    async fn insert_many(&self, files: &[MediaFile]) -> Result<()>;

    async fn update(&self, file: &MediaFile) -> Result<()>;

    async fn update_many(&self, files: &[MediaFile]) -> Result<()>;

    async fn delete(&self, id: MediaFileId) -> Result<()>;

    async fn delete_many(&self, ids: &[MediaFileId]) -> Result<()>;

    async fn get(&self, id: MediaFileId) -> Result<Option<MediaFile>>;

    async fn get_many(&self, ids: &[MediaFileId]) -> Result<Vec<MediaFile>>;

    async fn files_for_item(&self, item_id: LibraryItemId) -> Result<Vec<MediaFile>>;

    /// Rows whose path lies strictly below `base`.
    async fn files_with_base_path(&self, base: &Path) -> Result<Vec<MediaFile>>;

    async fn file_with_path(&self, path: &Path) -> Result<Option<MediaFile>>;
}

#[async_trait]
pub trait LibraryItemRepository: Send + Sync {
    async fn get(&self, id: LibraryItemId) -> Result<Option<LibraryItem>>;

    async fn all(&self) -> Result<Vec<LibraryItem>>;

    /// Items whose folder lies below `root`.
    async fn items_under_root(&self, root: &Path) -> Result<Vec<LibraryItem>>;

    async fn upsert(&self, item: &LibraryItem) -> Result<()>;

    async fn delete(&self, id: LibraryItemId) -> Result<()>;
}

#[async_trait]
pub trait RootFolderRepository: Send + Sync {
    async fn all(&self) -> Result<Vec<RootFolder>>;

    async fn get(&self, id: RootFolderId) -> Result<Option<RootFolder>>;

    async fn insert(&self, root: &RootFolder) -> Result<()>;

    async fn delete(&self, id: RootFolderId) -> Result<()>;
}
