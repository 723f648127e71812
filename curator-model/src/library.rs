use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::{LibraryItemId, RootFolderId};

/// The kind of item a folder under a root represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ItemKind {
    Movie,
    Artist,
    Author,
    Book,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Artist => "artist",
            ItemKind::Author => "author",
            ItemKind::Book => "book",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ItemKind::Movie),
            "artist" => Ok(ItemKind::Artist),
            "author" => Ok(ItemKind::Author),
            "book" => Ok(ItemKind::Book),
            other => Err(ModelError::InvalidValue(format!(
                "unknown item kind: {other}"
            ))),
        }
    }
}

/// A movie, artist, author or book. Owns one folder under a root folder and
/// bounds every scan and cleanup operation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibraryItem {
    pub id: LibraryItemId,
    pub kind: ItemKind,
    pub title: String,
    /// Absolute path of the item folder.
    pub path: PathBuf,
    pub release_date: Option<DateTime<Utc>>,
}

impl LibraryItem {
    pub fn new(
        kind: ItemKind,
        title: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: LibraryItemId::new(),
            kind,
            title: title.into(),
            path: path.into(),
            release_date: None,
        }
    }
}

impl fmt::Display for LibraryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.title)
    }
}

/// A top-level watched directory. Many library items live beneath one root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RootFolder {
    pub id: RootFolderId,
    pub path: PathBuf,
}

impl RootFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: RootFolderId::new(),
            path: path.into(),
        }
    }
}
