//! In-memory repositories for tests and database-less embedding.

use async_trait::async_trait;
use curator_model::{LibraryItem, LibraryItemId, MediaFile, MediaFileId, RootFolder, RootFolderId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::ports::{LibraryItemRepository, MediaFileRepository, RootFolderRepository};
use crate::error::{MediaError, Result};
use crate::fs::is_nested_under;

#[derive(Default)]
pub struct InMemoryMediaFileRepository {
    files: RwLock<HashMap<MediaFileId, MediaFile>>,
}

impl fmt::Debug for InMemoryMediaFileRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMediaFileRepository")
            .field("files", &self.files.read().len())
            .finish()
    }
}

impl InMemoryMediaFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn check_unique_path(
        files: &HashMap<MediaFileId, MediaFile>,
        file: &MediaFile,
    ) -> Result<()> {
        if files
            .values()
            .any(|existing| existing.id != file.id && existing.path == file.path)
        {
            return Err(MediaError::Conflict(format!(
                "a media file already exists at {}",
                file.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaFileRepository for InMemoryMediaFileRepository {
    async fn insert(&self, file: &MediaFile) -> Result<()> {
        let mut files = self.files.write();
        if files.contains_key(&file.id) {
            return Err(MediaError::Conflict(format!("media file {} already exists", file.id)));
        }
        Self::check_unique_path(&files, file)?;
        files.insert(file.id, file.clone());
        Ok(())
    }

    async fn insert_many(&self, batch: &[MediaFile]) -> Result<()> {
        let mut files = self.files.write();
        for file in batch {
            if files.contains_key(&file.id) {
                return Err(MediaError::Conflict(format!("media file {} already exists", file.id)));
            }
            Self::check_unique_path(&files, file)?;
        }
        for file in batch {
            files.insert(file.id, file.clone());
        }
        Ok(())
    }

    async fn update(&self, file: &MediaFile) -> Result<()> {
        let mut files = self.files.write();
        if !files.contains_key(&file.id) {
            return Err(MediaError::NotFound(format!("media file {}", file.id)));
        }
        Self::check_unique_path(&files, file)?;
        files.insert(file.id, file.clone());
        Ok(())
    }

    async fn update_many(&self, batch: &[MediaFile]) -> Result<()> {
        for file in batch {
            self.update(file).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: MediaFileId) -> Result<()> {
        self.files.write().remove(&id);
        Ok(())
    }

    async fn delete_many(&self, ids: &[MediaFileId]) -> Result<()> {
        let mut files = self.files.write();
        for id in ids {
            files.remove(id);
        }
        Ok(())
    }

    async fn get(&self, id: MediaFileId) -> Result<Option<MediaFile>> {
        Ok(self.files.read().get(&id).cloned())
    }

    async fn get_many(&self, ids: &[MediaFileId]) -> Result<Vec<MediaFile>> {
        let files = self.files.read();
        Ok(ids.iter().filter_map(|id| files.get(id).cloned()).collect())
    }

    async fn files_for_item(&self, item_id: LibraryItemId) -> Result<Vec<MediaFile>> {
        let mut out: Vec<MediaFile> = self
            .files
            .read()
            .values()
            .filter(|file| file.item_id == item_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn files_with_base_path(&self, base: &Path) -> Result<Vec<MediaFile>> {
        let mut out: Vec<MediaFile> = self
            .files
            .read()
            .values()
            .filter(|file| is_nested_under(&file.path, base))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn file_with_path(&self, path: &Path) -> Result<Option<MediaFile>> {
        Ok(self
            .files
            .read()
            .values()
            .find(|file| file.path == path)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryLibraryItemRepository {
    items: RwLock<HashMap<LibraryItemId, LibraryItem>>,
}

impl fmt::Debug for InMemoryLibraryItemRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryLibraryItemRepository")
            .field("items", &self.items.read().len())
            .finish()
    }
}

impl InMemoryLibraryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LibraryItemRepository for InMemoryLibraryItemRepository {
    async fn get(&self, id: LibraryItemId) -> Result<Option<LibraryItem>> {
        Ok(self.items.read().get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<LibraryItem>> {
        let mut items: Vec<LibraryItem> = self.items.read().values().cloned().collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    async fn items_under_root(&self, root: &Path) -> Result<Vec<LibraryItem>> {
        let mut items: Vec<LibraryItem> = self
            .items
            .read()
            .values()
            .filter(|item| is_nested_under(&item.path, root))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    async fn upsert(&self, item: &LibraryItem) -> Result<()> {
        self.items.write().insert(item.id, item.clone());
        Ok(())
    }

    async fn delete(&self, id: LibraryItemId) -> Result<()> {
        self.items.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRootFolderRepository {
    roots: RwLock<HashMap<RootFolderId, RootFolder>>,
}

impl fmt::Debug for InMemoryRootFolderRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRootFolderRepository")
            .field("roots", &self.roots.read().len())
            .finish()
    }
}

impl InMemoryRootFolderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RootFolderRepository for InMemoryRootFolderRepository {
    async fn all(&self) -> Result<Vec<RootFolder>> {
        let mut roots: Vec<RootFolder> = self.roots.read().values().cloned().collect();
        roots.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(roots)
    }

    async fn get(&self, id: RootFolderId) -> Result<Option<RootFolder>> {
        Ok(self.roots.read().get(&id).cloned())
    }

    async fn insert(&self, root: &RootFolder) -> Result<()> {
        let mut roots = self.roots.write();
        if roots.values().any(|existing| existing.path == root.path) {
            return Err(MediaError::Conflict(format!(
                "root folder {} is already registered",
                root.path.display()
            )));
        }
        roots.insert(root.id, root.clone());
        Ok(())
    }

    async fn delete(&self, id: RootFolderId) -> Result<()> {
        self.roots.write().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn file_at(item_id: LibraryItemId, path: &str) -> MediaFile {
        MediaFile::new(item_id, Path::new("/media/movies"), PathBuf::from(path), 1, Utc::now())
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_paths() {
        let repo = InMemoryMediaFileRepository::new();
        let item_id = LibraryItemId::new();
        repo.insert(&file_at(item_id, "/media/movies/a.mkv")).await.unwrap();

        let err = repo
            .insert(&file_at(item_id, "/media/movies/a.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Conflict(_)));
    }

    #[tokio::test]
    async fn base_path_lookup_is_per_component() {
        let repo = InMemoryMediaFileRepository::new();
        let item_id = LibraryItemId::new();
        repo.insert_many(&[
            file_at(item_id, "/media/movies/Alien (1979)/alien.mkv"),
            file_at(item_id, "/media/movies/Alien (1979) Extended/alien.mkv"),
        ])
        .await
        .unwrap();

        let found = repo
            .files_with_base_path(Path::new("/media/movies/Alien (1979)"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].path,
            PathBuf::from("/media/movies/Alien (1979)/alien.mkv")
        );
    }
}
