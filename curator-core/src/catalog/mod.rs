//! Persistent records of which media files exist, which library item owns
//! them, and which root folders are watched.
//!
//! Repositories are port traits with a Postgres adapter (behind the
//! `database` feature) and an in-memory adapter. [`CatalogStore`] layers the
//! change events and the unchanged-file filter on top.

pub mod memory;
pub mod ports;
#[cfg(feature = "database")]
pub mod postgres;
pub mod roots;
pub mod store;

pub use memory::{
    InMemoryLibraryItemRepository, InMemoryMediaFileRepository, InMemoryRootFolderRepository,
};
pub use ports::{LibraryItemRepository, MediaFileRepository, RootFolderRepository};
#[cfg(feature = "database")]
pub use postgres::{
    PostgresLibraryItemRepository, PostgresMediaFileRepository, PostgresRootFolderRepository,
};
pub use roots::{RootFolderService, best_root_folder_path};
pub use store::{CatalogStore, modified_matches};
