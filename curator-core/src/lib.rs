//! # Curator Core
//!
//! Library reconciliation and file-relocation engine for the Curator media
//! manager.
//!
//! ## Overview
//!
//! `curator-core` keeps a catalog of media files in step with what is on disk
//! and moves files into their canonical location:
//!
//! - **Scanning**: walk one library item folder, reconcile the catalog, run
//!   the import pipeline and clean up empty folders
//! - **Change Watching**: watch every root folder, coalesce bursts of changes
//!   into debounced known-files rescans
//! - **Self-change Suppression**: paths the engine announces before writing
//!   never schedule a rescan of their own
//! - **Relocation**: move, copy or hard link files into place, creating the
//!   folder chain and rewriting the catalog row
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL repositories and the embedded [`MIGRATOR`]
//! - `fs-watch`: live root-folder watching through `notify`
//!
//! ## Architecture
//!
//! - [`catalog`]: repositories and the event-emitting [`catalog::CatalogStore`]
//! - [`scan`]: path filter, reconciler, scanner and the rescan executor
//! - [`fs_watch`]: change ledger, debouncer, scan trigger and watch service
//! - [`relocate`]: the relocator, transfer strategies and batch renames
//! - [`runtime`]: wires everything into a running [`runtime::LibraryRuntime`]
//!
//! ## Examples
//!
//! ```no_run
//! use curator_core::config::EngineConfig;
//! use curator_core::runtime::{EngineRepositories, LibraryRuntime, RuntimeCollaborators};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run() -> curator_core::Result<()> {
//!     let runtime = LibraryRuntime::build(
//!         EngineConfig::default(),
//!         EngineRepositories::in_memory(),
//!         RuntimeCollaborators::default(),
//!     )?;
//!     let cancel = CancellationToken::new();
//!     let _tasks = runtime.start(cancel.clone()).await?;
//!     runtime.roots().add("/media/movies").await?;
//!     cancel.cancel();
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// File dates and unix permissions applied after writes
pub mod attributes;

/// Repositories and the catalog store
pub mod catalog;

/// Ports to the import pipeline, naming and rescan scheduling
pub mod collaborators;

/// Typed engine settings
pub mod config;

/// Error types
pub mod error;

/// Engine notifications
pub mod events;

/// Filesystem abstraction with real and in-memory implementations
pub mod fs;

/// Root-folder watching and debounced rescans
pub mod fs_watch;

/// Moving files into their canonical location
pub mod relocate;

/// Engine assembly and background tasks
pub mod runtime;

/// Item scanning and rescan execution
pub mod scan;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use error::{MediaError, Result};
