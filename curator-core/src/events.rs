use async_trait::async_trait;
use curator_model::{
    DeleteMediaFileReason, LibraryItemId, MediaFile, MediaFileId, RootFolder,
    ScanSkippedReason,
};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::Result;

/// Notifications emitted by the engine after state changes.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A scan stopped before listing files.
    ScanSkipped {
        item_id: LibraryItemId,
        reason: ScanSkippedReason,
    },
    /// A scan finished reconciling the item.
    Scanned { item_id: LibraryItemId },
    /// Folders were created for a relocated file.
    FolderCreated(FolderCreated),
    /// A file now lives at a new path.
    FileMoved { file: MediaFile, old_path: PathBuf },
    MediaFileAdded { file: MediaFile },
    MediaFileDeleted {
        file: MediaFile,
        reason: DeleteMediaFileReason,
    },
    /// At least one file of the item was renamed.
    ItemRenamed { item_id: LibraryItemId },
    RootFolderAdded { root: RootFolder },
    RootFolderRemoved { root: RootFolder },
}

/// Which levels of a relocated file's folder chain were newly created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderCreated {
    pub item_id: LibraryItemId,
    pub file_id: MediaFileId,
    /// The item folder directly under the root.
    pub item_folder: Option<PathBuf>,
    /// An intermediate folder such as an album or a book.
    pub sub_folder: Option<PathBuf>,
    /// The folder holding the file itself.
    pub leaf_folder: Option<PathBuf>,
}

impl FolderCreated {
    pub fn is_empty(&self) -> bool {
        self.item_folder.is_none() && self.sub_folder.is_none() && self.leaf_folder.is_none()
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EngineEvent) -> Result<()>;
}

/// Publish and log on failure. Event delivery never fails the caller's
/// operation.
pub(crate) async fn publish_or_warn(publisher: &dyn EventPublisher, event: EngineEvent) {
    if let Err(err) = publisher.publish(event).await {
        warn!(error = %err, "failed to publish engine event");
    }
}

/// In-process fan-out of engine events over a tokio broadcast channel.
/// Subscribers that fall behind see `RecvError::Lagged` and miss events.
pub struct InProcEventBus {
    sender: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for InProcEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for InProcEventBus {
    async fn publish(&self, event: EngineEvent) -> Result<()> {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}
