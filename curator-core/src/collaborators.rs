//! Seams to the parts of the media manager this engine drives but does not
//! own: import decisions, importing, naming and rescan scheduling.

use async_trait::async_trait;
use curator_model::{FilterFilesType, LibraryItem, MediaFile, MediaInfo, Quality, RescanRequest};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::error::{MediaError, Result};
use crate::fs::LocalFile;

/// Verdict of the decision pipeline for one on-disk file.
#[derive(Debug, Clone)]
pub struct ImportDecision {
    pub local: LocalFile,
    pub quality: Quality,
    pub media_info: Option<MediaInfo>,
    pub scene_name: Option<String>,
    pub release_group: Option<String>,
    /// Empty when the file was approved.
    pub rejections: Vec<String>,
}

impl ImportDecision {
    pub fn approved(local: LocalFile) -> Self {
        Self {
            local,
            quality: Quality::unknown(),
            media_info: None,
            scene_name: None,
            release_group: None,
            rejections: Vec::new(),
        }
    }

    pub fn rejected(local: LocalFile, reason: impl Into<String>) -> Self {
        Self {
            rejections: vec![reason.into()],
            ..Self::approved(local)
        }
    }

    pub fn is_approved(&self) -> bool {
        self.rejections.is_empty()
    }
}

/// Outcome of importing one decision.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub path: PathBuf,
    pub imported: bool,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait ImportDecisionMaker: Send + Sync {
    /// Classify `files` for `item`. Implementations return one decision per
    /// file they recognise; files they skip are not imported.
    async fn decide(
        &self,
        files: Vec<LocalFile>,
        item: &LibraryItem,
        filter: FilterFilesType,
    ) -> Result<Vec<ImportDecision>>;
}

#[async_trait]
pub trait Importer: Send + Sync {
    async fn import(
        &self,
        decisions: &[ImportDecision],
        item: &LibraryItem,
    ) -> Result<Vec<ImportResult>>;
}

/// Builds destination names for relocations.
pub trait FileNameBuilder: Send + Sync {
    /// File name without extension.
    fn build_file_name(&self, item: &LibraryItem, file: &MediaFile) -> String;

    /// Absolute destination path for `file_name`; `extension` carries its
    /// leading dot.
    fn build_file_path(&self, item: &LibraryItem, file_name: &str, extension: &str) -> PathBuf;

    /// Intermediate folder between the item folder and the file, when the
    /// layout has one (album, book).
    fn build_sub_folder(&self, _item: &LibraryItem, _file: &MediaFile) -> Option<PathBuf> {
        None
    }
}

/// Receives coalesced rescan requests from the watch trigger.
#[async_trait]
pub trait RescanScheduler: Send + Sync {
    async fn submit(&self, request: RescanRequest) -> Result<()>;
}

/// Scheduler that forwards requests to a bounded mpsc channel consumed by
/// the rescan executor.
#[derive(Clone)]
pub struct ChannelRescanScheduler {
    tx: mpsc::Sender<RescanRequest>,
}

impl fmt::Debug for ChannelRescanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRescanScheduler")
            .field("capacity", &self.tx.max_capacity())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl ChannelRescanScheduler {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RescanRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RescanScheduler for ChannelRescanScheduler {
    async fn submit(&self, request: RescanRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| MediaError::Internal("rescan queue is closed".into()))
    }
}

/// Approves every file unchanged. Used when no richer pipeline is wired in:
/// files are then tracked as unmatched rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllDecisions;

#[async_trait]
impl ImportDecisionMaker for AcceptAllDecisions {
    async fn decide(
        &self,
        files: Vec<LocalFile>,
        _item: &LibraryItem,
        _filter: FilterFilesType,
    ) -> Result<Vec<ImportDecision>> {
        Ok(files.into_iter().map(ImportDecision::approved).collect())
    }
}

/// Importer that leaves cataloguing to the scanner's unmatched-file pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogOnlyImporter;

#[async_trait]
impl Importer for CatalogOnlyImporter {
    async fn import(
        &self,
        decisions: &[ImportDecision],
        _item: &LibraryItem,
    ) -> Result<Vec<ImportResult>> {
        Ok(decisions
            .iter()
            .map(|decision| ImportResult {
                path: decision.local.path.clone(),
                imported: false,
                errors: decision.rejections.clone(),
            })
            .collect())
    }
}

/// Keeps each file's own name and places it directly in the item folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatFileNames;

impl FileNameBuilder for FlatFileNames {
    fn build_file_name(&self, _item: &LibraryItem, file: &MediaFile) -> String {
        file.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.id.to_string())
    }

    fn build_file_path(&self, item: &LibraryItem, file_name: &str, extension: &str) -> PathBuf {
        item.path.join(format!("{file_name}{extension}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_model::FilterFilesType;

    #[tokio::test]
    async fn channel_scheduler_delivers_and_reports_closed_queue() {
        let (scheduler, mut rx) = ChannelRescanScheduler::channel(2);
        scheduler
            .submit(RescanRequest::known_files(vec![PathBuf::from("/media/movies")]))
            .await
            .unwrap();

        let request = rx.recv().await.unwrap();
        assert_eq!(request.roots, vec![PathBuf::from("/media/movies")]);
        assert_eq!(request.filter, FilterFilesType::Known);

        drop(rx);
        assert!(scheduler
            .submit(RescanRequest::known_files(vec![]))
            .await
            .is_err());
    }
}
