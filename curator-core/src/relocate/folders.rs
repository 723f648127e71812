use curator_model::{LibraryItem, MediaFile};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::attributes::MediaFileAttributes;
use crate::error::{MediaError, Result};
use crate::events::FolderCreated;
use crate::fs::{FileSystem, create_folder_all};
use crate::fs_watch::ChangeReporter;

/// Folders between a root folder and a relocated file:
/// `root / item_folder [/ sub_folder] / ... / leaf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderChain {
    pub root: PathBuf,
    pub item_folder: PathBuf,
    pub sub_folder: Option<PathBuf>,
    pub leaf_folder: PathBuf,
}

impl FolderChain {
    /// `sub_folder` is the absolute intermediate folder from the naming
    /// collaborator, if the layout has one.
    pub fn resolve(
        item: &LibraryItem,
        sub_folder: Option<PathBuf>,
        destination: &Path,
    ) -> Result<Self> {
        let root = item.path.parent().ok_or_else(|| {
            MediaError::InvalidPath(format!("{} has no root folder", item.path.display()))
        })?;
        let leaf = destination.parent().ok_or_else(|| {
            MediaError::InvalidPath(format!("{} has no parent folder", destination.display()))
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            item_folder: item.path.clone(),
            sub_folder: sub_folder.filter(|sub| *sub != item.path && sub.as_path() != leaf),
            leaf_folder: leaf.to_path_buf(),
        })
    }

    /// Item, sub and leaf folders, without repeats.
    pub fn folders(&self) -> Vec<&Path> {
        let mut folders = vec![self.item_folder.as_path()];
        if let Some(sub) = &self.sub_folder {
            folders.push(sub);
        }
        if self.leaf_folder != self.item_folder {
            folders.push(&self.leaf_folder);
        }
        folders
    }

    /// Register the chain with `reporter`, then create every missing folder
    /// with its parents. Fails with [`MediaError::DestinationRootMissing`]
    /// before touching disk when the root is absent.
    pub async fn ensure(
        &self,
        fs: &dyn FileSystem,
        attributes: &MediaFileAttributes,
        reporter: &dyn ChangeReporter,
        item: &LibraryItem,
        file: &MediaFile,
    ) -> Result<FolderCreated> {
        if !fs.folder_exists(&self.root).await {
            return Err(MediaError::DestinationRootMissing(self.root.clone()));
        }

        reporter.report_change_beginning(&self.folders());

        let mut created = FolderCreated {
            item_id: item.id,
            file_id: file.id,
            ..FolderCreated::default()
        };

        if create_missing(fs, attributes, &self.item_folder).await? {
            created.item_folder = Some(self.item_folder.clone());
        }
        if let Some(sub) = &self.sub_folder
            && create_missing(fs, attributes, sub).await?
        {
            created.sub_folder = Some(sub.clone());
        }
        if self.leaf_folder != self.item_folder
            && create_missing(fs, attributes, &self.leaf_folder).await?
        {
            created.leaf_folder = Some(self.leaf_folder.clone());
        }

        Ok(created)
    }
}

async fn create_missing(
    fs: &dyn FileSystem,
    attributes: &MediaFileAttributes,
    folder: &Path,
) -> Result<bool> {
    if fs.folder_exists(folder).await {
        return Ok(false);
    }

    let made = match create_folder_all(fs, folder).await {
        Ok(made) => made,
        Err(err) => {
            error!(error = %err, "Unable to create directory: {}", folder.display());
            return Err(err.into());
        }
    };
    for path in &made {
        debug!("Created folder {}", path.display());
        attributes.set_folder_permissions(path).await;
    }
    Ok(!made.is_empty())
}
