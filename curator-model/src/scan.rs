use std::fmt;
use std::path::PathBuf;

/// Why a scan of a library item stopped before listing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanSkippedReason {
    /// The item's root folder does not exist.
    RootFolderMissing,
    /// The root folder exists but has no sub-directories, which usually
    /// means an unmounted share rather than an empty library.
    RootFolderEmpty,
    /// The item's own folder does not exist.
    ItemFolderMissing,
}

impl fmt::Display for ScanSkippedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScanSkippedReason::RootFolderMissing => "root folder missing",
            ScanSkippedReason::RootFolderEmpty => "root folder is empty",
            ScanSkippedReason::ItemFolderMissing => "item folder missing",
        };
        f.write_str(label)
    }
}

/// Result of one scanner run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanOutcome {
    Scanned,
    Skipped(ScanSkippedReason),
}

impl ScanOutcome {
    pub fn is_scanned(&self) -> bool {
        matches!(self, ScanOutcome::Scanned)
    }
}

/// Which on-disk files are handed to the decision pipeline on a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterFilesType {
    /// Every file, known or not.
    None,
    /// Skip files whose catalog row matches size and modified time.
    #[default]
    Known,
    /// Skip unchanged files only when they are matched to the item.
    Matched,
}

/// Why a catalog row was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeleteMediaFileReason {
    MissingFromDisk,
    Manual,
    Upgrade,
}

impl fmt::Display for DeleteMediaFileReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeleteMediaFileReason::MissingFromDisk => "missing from disk",
            DeleteMediaFileReason::Manual => "manual",
            DeleteMediaFileReason::Upgrade => "upgrade",
        };
        f.write_str(label)
    }
}

/// A request to rescan every library item under the given root folders.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RescanRequest {
    pub roots: Vec<PathBuf>,
    pub filter: FilterFilesType,
    pub force_full_rescan: bool,
}

impl RescanRequest {
    /// Lightweight rescan limited to changed or unknown files.
    pub fn known_files(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            filter: FilterFilesType::Known,
            force_full_rescan: false,
        }
    }
}
