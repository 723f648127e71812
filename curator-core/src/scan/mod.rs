//! Disk scanning for library items.
//!
//! [`Scanner`] walks one item folder and brings the catalog in line with
//! disk; [`RescanExecutor`] fans rescan requests out over the items under
//! each requested root.

pub mod executor;
pub mod path_filter;
pub mod reconciler;
pub mod scanner;

pub use executor::{RescanExecutor, RescanSummary};
pub use path_filter::{PathFilter, default_media_extensions};
pub use reconciler::{ReconcileReport, Reconciler};
pub use scanner::{Scanner, ScannerDeps};
