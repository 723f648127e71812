use curator_model::{RootFolder, RootFolderId};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::ports::RootFolderRepository;
use crate::error::{MediaError, Result};
use crate::events::{EngineEvent, EventPublisher, publish_or_warn};
use crate::fs::{is_nested_under, normalize_path};

/// Registers and removes root folders. Watchers follow along through the
/// `RootFolderAdded` / `RootFolderRemoved` events.
#[derive(Clone)]
pub struct RootFolderService {
    roots: Arc<dyn RootFolderRepository>,
    events: Arc<dyn EventPublisher>,
}

impl fmt::Debug for RootFolderService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootFolderService").finish_non_exhaustive()
    }
}

impl RootFolderService {
    pub fn new(roots: Arc<dyn RootFolderRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { roots, events }
    }

    pub async fn all(&self) -> Result<Vec<RootFolder>> {
        self.roots.all().await
    }

    pub async fn add(&self, path: impl AsRef<Path>) -> Result<RootFolder> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(MediaError::InvalidPath(format!(
                "root folder must be absolute: {}",
                path.display()
            )));
        }
        let root = RootFolder::new(normalize_path(path));
        self.roots.insert(&root).await?;
        info!("Added root folder {}", root.path.display());
        publish_or_warn(
            self.events.as_ref(),
            EngineEvent::RootFolderAdded { root: root.clone() },
        )
        .await;
        Ok(root)
    }

    pub async fn remove(&self, id: RootFolderId) -> Result<()> {
        let root = self
            .roots
            .get(id)
            .await?
            .ok_or_else(|| MediaError::NotFound(format!("root folder {id}")))?;
        self.roots.delete(id).await?;
        info!("Removed root folder {}", root.path.display());
        publish_or_warn(self.events.as_ref(), EngineEvent::RootFolderRemoved { root }).await;
        Ok(())
    }

    /// The registered root that contains `item_path`, falling back to the
    /// item's parent directory.
    pub async fn best_root_for(&self, item_path: &Path) -> Result<PathBuf> {
        let roots = self.roots.all().await?;
        Ok(best_root_folder_path(&roots, item_path))
    }
}

/// Longest registered root containing `item_path`, or its parent directory
/// when no root matches.
pub fn best_root_folder_path(roots: &[RootFolder], item_path: &Path) -> PathBuf {
    roots
        .iter()
        .filter(|root| is_nested_under(item_path, &root.path))
        .max_by_key(|root| root.path.components().count())
        .map(|root| root.path.clone())
        .unwrap_or_else(|| {
            item_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| item_path.to_path_buf())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryRootFolderRepository;
    use crate::events::InProcEventBus;

    #[test]
    fn best_root_prefers_the_deepest_match() {
        let roots = vec![
            RootFolder::new("/media"),
            RootFolder::new("/media/movies"),
        ];
        assert_eq!(
            best_root_folder_path(&roots, Path::new("/media/movies/Alien (1979)")),
            PathBuf::from("/media/movies")
        );
        assert_eq!(
            best_root_folder_path(&roots, Path::new("/other/Alien (1979)")),
            PathBuf::from("/other")
        );
    }

    #[tokio::test]
    async fn add_and_remove_publish_events() {
        let bus = Arc::new(InProcEventBus::default());
        let mut rx = bus.subscribe();
        let service = RootFolderService::new(Arc::new(InMemoryRootFolderRepository::new()), bus);

        let root = service.add("/media/movies/").await.unwrap();
        assert_eq!(root.path, PathBuf::from("/media/movies"));
        assert!(service.add("relative/path").await.is_err());
        assert!(service.add("/media/movies").await.is_err());

        service.remove(root.id).await.unwrap();
        assert!(service.all().await.unwrap().is_empty());

        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::RootFolderAdded { .. }));
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::RootFolderRemoved { .. }));
    }
}
