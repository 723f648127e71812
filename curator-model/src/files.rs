use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::ids::{LibraryItemId, MediaFileId};

/// A catalogued file on disk owned by one library item.
///
/// At most one live row may reference a given on-disk `path`.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaFile {
    pub id: MediaFileId,
    pub item_id: LibraryItemId,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the owning item's folder.
    pub relative_path: PathBuf,
    pub size: u64,
    pub date_added: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub scene_name: Option<String>,
    pub release_group: Option<String>,
    pub quality: Quality,
    pub media_info: Option<MediaInfo>,
    /// Whether the import pipeline mapped this file onto the item's content.
    /// Unmatched rows are still tracked so rescans treat them as known.
    pub matched: bool,
}

impl MediaFile {
    /// Build a fresh, unmatched row for `path` under `item_path`.
    pub fn new(
        item_id: LibraryItemId,
        item_path: &Path,
        path: PathBuf,
        size: u64,
        modified: DateTime<Utc>,
    ) -> Self {
        let relative_path = path
            .strip_prefix(item_path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());

        Self {
            id: MediaFileId::new(),
            item_id,
            path,
            relative_path,
            size,
            date_added: Utc::now(),
            modified,
            scene_name: None,
            release_group: None,
            quality: Quality::unknown(),
            media_info: None,
            matched: false,
        }
    }

    /// File extension without the leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("id", &self.id)
            .field("item_id", &self.item_id)
            .field("path", &self.path)
            .field("size", &self.size)
            .field("modified", &self.modified)
            .field("quality", &self.quality.name)
            .field("matched", &self.matched)
            .finish()
    }
}

impl fmt::Display for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.relative_path.display())
    }
}

/// Quality descriptor attached by the import pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quality {
    pub name: String,
    pub revision: u32,
}

impl Quality {
    pub fn new(name: impl Into<String>, revision: u32) -> Self {
        Self {
            name: name.into(),
            revision,
        }
    }

    pub fn unknown() -> Self {
        Self::new("Unknown", 1)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Technical metadata probed from the file. Stored as a JSON blob.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaInfo {
    pub container: Option<String>,
    pub duration_secs: Option<f64>,
    pub bitrate: Option<u64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_is_stripped_from_item_folder() {
        let item = Path::new("/media/movies/Alien (1979)");
        let file = MediaFile::new(
            LibraryItemId::new(),
            item,
            item.join("Alien.1979.mkv"),
            42,
            Utc::now(),
        );

        assert_eq!(file.relative_path, PathBuf::from("Alien.1979.mkv"));
        assert_eq!(file.extension(), Some("mkv"));
        assert!(!file.matched);
    }

    #[test]
    fn relative_path_falls_back_to_full_path_outside_item() {
        let file = MediaFile::new(
            LibraryItemId::new(),
            Path::new("/media/movies/Alien (1979)"),
            PathBuf::from("/downloads/Alien.1979.mkv"),
            42,
            Utc::now(),
        );

        assert_eq!(file.relative_path, PathBuf::from("/downloads/Alien.1979.mkv"));
    }
}
