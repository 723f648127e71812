//! The disk-level primitive behind every relocation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, Result};

/// How a file reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Move,
    Copy,
    /// Hard link when source and destination share a filesystem, copy
    /// otherwise.
    HardLinkOrCopy,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferMode::Move => "move",
            TransferMode::Copy => "copy",
            TransferMode::HardLinkOrCopy => "hardlink",
        };
        f.write_str(label)
    }
}

#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Put `source` at `destination`. Leaves no partial destination behind on
    /// failure. Returns the mode actually used: a failed hard link reports
    /// [`TransferMode::Copy`].
    async fn transfer(
        &self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
    ) -> Result<TransferMode>;
}

/// [`FileTransfer`] over the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransfer;

impl LocalTransfer {
    pub fn new() -> Self {
        Self
    }
}

fn partial_path(destination: &Path) -> Result<PathBuf> {
    let name = destination.file_name().ok_or_else(|| {
        MediaError::InvalidPath(format!("{} has no file name", destination.display()))
    })?;
    Ok(destination.with_file_name(format!(".{}.partial~", name.to_string_lossy())))
}

/// Copy through a hidden sibling and rename into place.
async fn copy_into_place(source: &Path, destination: &Path) -> Result<()> {
    let partial = partial_path(destination)?;

    if let Err(err) = fs::copy(source, &partial).await {
        let _ = fs::remove_file(&partial).await;
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&partial, destination).await {
        let _ = fs::remove_file(&partial).await;
        return Err(err.into());
    }
    Ok(())
}

#[async_trait]
impl FileTransfer for LocalTransfer {
    async fn transfer(
        &self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
    ) -> Result<TransferMode> {
        if fs::try_exists(destination).await? {
            return Err(MediaError::Conflict(format!(
                "destination already exists: {}",
                destination.display()
            )));
        }

        match mode {
            TransferMode::Move => match fs::rename(source, destination).await {
                Ok(()) => Ok(TransferMode::Move),
                Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                    debug!(
                        "Rename across devices, copying {} to {}",
                        source.display(),
                        destination.display()
                    );
                    copy_into_place(source, destination).await?;
                    fs::remove_file(source).await?;
                    Ok(TransferMode::Move)
                }
                Err(err) => Err(err.into()),
            },
            TransferMode::Copy => {
                copy_into_place(source, destination).await?;
                Ok(TransferMode::Copy)
            }
            TransferMode::HardLinkOrCopy => match fs::hard_link(source, destination).await {
                Ok(()) => Ok(TransferMode::HardLinkOrCopy),
                Err(err) => {
                    warn!(error = %err, "Hardlink failed, copying {} instead", source.display());
                    copy_into_place(source, destination).await?;
                    Ok(TransferMode::Copy)
                }
            },
        }
    }
}
