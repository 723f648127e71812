//! Decides which on-disk paths under an item folder the scanner may examine.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use crate::fs::LocalFile;

/// Extensions counted as media out of the box: video, audio and ebooks.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    // video
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpg", "mpeg", "ts", "m2ts", "iso",
    "divx", "xvid", "ogm", "vob", // audio
    "mp3", "flac", "m4a", "m4b", "aac", "ogg", "oga", "opus", "wav", "wma", "ape", "alac", "aiff",
    "wv", // books
    "epub", "mobi", "azw", "azw3", "pdf", "cbz", "cbr",
];

pub fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Folder segments never scanned: bonus material, NAS metadata, fan art,
/// Plex optimised copies and anything hidden. Matched against the path
/// relative to the item folder, so the segment must be followed by a
/// separator to count.
static EXCLUDED_SUB_FOLDERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\\|/|^)(?:extras|@eadir|extrafanart|plex versions|\.[^\\/]+)(?:\\|/)")
        .expect("valid excluded folder pattern")
});

/// File names never scanned: AppleDouble, Windows and macOS thumbnails,
/// in-flight partial transfers.
static EXCLUDED_FILES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\._|^Thumbs\.db$|^\.DS_store$|\.partial~$")
        .expect("valid excluded file pattern")
});

/// Suffixes left behind by in-flight copies and backups.
pub const TRANSIENT_SUFFIXES: &[&str] = &[".partial~", ".backup~"];

/// Pure path classification. No disk access.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: HashSet<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIA_EXTENSIONS)
    }
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Whether `path` carries a recognised media extension.
    pub fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }

    /// Whether `path` must be skipped when scanning below `item_root`.
    /// Paths outside `item_root` are never excluded by the folder rule.
    pub fn is_excluded(&self, item_root: &Path, path: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(item_root)
            && EXCLUDED_SUB_FOLDERS.is_match(&relative.to_string_lossy())
        {
            return true;
        }

        path.file_name()
            .map(|name| EXCLUDED_FILES.is_match(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Keep media files under `item_root` that pass both exclusion rules.
    pub fn filter_files(&self, item_root: &Path, files: Vec<LocalFile>) -> Vec<LocalFile> {
        files
            .into_iter()
            .filter(|file| self.is_media(&file.path) && !self.is_excluded(item_root, &file.path))
            .collect()
    }
}

/// Whether the path ends with a transient copy or backup suffix.
pub fn has_transient_suffix(path: &Path) -> bool {
    let text = path.to_string_lossy();
    TRANSIENT_SUFFIXES
        .iter()
        .any(|suffix| text.ends_with(suffix))
}
