//! Core data model definitions shared across Curator crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod error;
pub mod files;
pub mod ids;
pub mod library;
pub mod scan;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use files::{MediaFile, MediaInfo, Quality};
pub use ids::{LibraryItemId, MediaFileId, RootFolderId};
pub use library::{ItemKind, LibraryItem, RootFolder};
pub use scan::{
    DeleteMediaFileReason, FilterFilesType, RescanRequest, ScanOutcome,
    ScanSkippedReason,
};
