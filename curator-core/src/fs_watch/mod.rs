//! Live root-folder watching.
//!
//! Notify callbacks push `(path, root)` pairs into a [`ChangeLedger`] and
//! signal a [`Debouncer`]. When the quiet window expires the [`ScanTrigger`]
//! drains the ledger, drops changes the engine announced it would make
//! itself, and submits one known-files rescan per affected root.
//!
//! Anything about to write under a watched root calls
//! [`ChangeReporter::report_change_beginning`] first. Registrations last
//! until the next flush.

use std::path::Path;

pub mod debounce;
pub mod ledger;
#[cfg(feature = "fs-watch")]
pub mod service;
pub mod trigger;

pub use debounce::Debouncer;
pub use ledger::{ChangeLedger, DrainedChanges};
#[cfg(feature = "fs-watch")]
pub use service::RootFolderWatchService;
pub use trigger::{ScanTrigger, Suppression};

/// Announces engine-initiated filesystem writes so the resulting watch
/// notifications do not schedule a rescan.
pub trait ChangeReporter: Send + Sync {
    fn report_change_beginning(&self, paths: &[&Path]);
}

impl ChangeReporter for ChangeLedger {
    fn report_change_beginning(&self, paths: &[&Path]) {
        for path in paths {
            self.ignore(path);
        }
    }
}

/// Reporter for callers with no watcher wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChangeReporter;

impl ChangeReporter for NoopChangeReporter {
    fn report_change_beginning(&self, _paths: &[&Path]) {}
}
