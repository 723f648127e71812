use curator_model::RescanRequest;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::ChangeReporter;
use super::debounce::Debouncer;
use super::ledger::ChangeLedger;
use crate::collaborators::RescanScheduler;
use crate::config::WatchConfig;
use crate::error::Result;
use crate::fs::{FileSystem, is_nested_under};
use crate::scan::path_filter::{PathFilter, has_transient_suffix};

/// Why a pending change was dropped at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// The engine announced it would touch this path, a path under it, or
    /// one of its children. The parent rule also drops unrelated siblings'
    /// changes that surface as a parent event; that imprecision is accepted.
    Ignored,
    /// `.partial~` / `.backup~` leftovers.
    Transient,
    /// A file whose extension is not a media extension.
    NotMedia,
    /// No extension and not an existing directory.
    NotADirectory,
}

/// Coalesces watcher notifications into rescan requests, one per quiet
/// window, skipping changes the engine caused itself.
pub struct ScanTrigger {
    ledger: ChangeLedger,
    debouncer: Debouncer,
    filter: PathFilter,
    fs: Arc<dyn FileSystem>,
    scheduler: Arc<dyn RescanScheduler>,
}

impl fmt::Debug for ScanTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanTrigger")
            .field("ledger", &self.ledger)
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

/// Ignore rules: the path itself, anything below it, and its parent
/// directory. The parent rule catches watch backends that report a
/// directory-level event for a child operation; it also hides unrelated
/// changes to that parent within the same window.
fn matches_ignored(path: &Path, ignored: &[PathBuf]) -> bool {
    ignored.iter().any(|ignored| {
        path == ignored || is_nested_under(path, ignored) || ignored.parent() == Some(path)
    })
}

impl ScanTrigger {
    pub fn new(
        config: &WatchConfig,
        filter: PathFilter,
        fs: Arc<dyn FileSystem>,
        scheduler: Arc<dyn RescanScheduler>,
    ) -> Self {
        Self {
            ledger: ChangeLedger::new(),
            debouncer: Debouncer::new(config.debounce_window(), config.max_debounce()),
            filter,
            fs,
            scheduler,
        }
    }

    /// Queue a change under `root` and restart the quiet window.
    pub fn record_change(&self, path: &Path, root: &Path) {
        trace!("Queued change {} under {}", path.display(), root.display());
        self.ledger.record_change(path, root);
        self.debouncer.signal();
    }

    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// Run the debounce waiter; each expiry calls [`ScanTrigger::flush`].
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let trigger = Arc::clone(self);
        self.debouncer.spawn(
            move || {
                let trigger = Arc::clone(&trigger);
                async move {
                    if let Err(err) = trigger.flush().await {
                        warn!(error = %err, "Failed to schedule rescan");
                    }
                }
            },
            cancel,
        )
    }

    pub async fn suppression(&self, path: &Path, ignored: &[PathBuf]) -> Option<Suppression> {
        if matches_ignored(path, ignored) {
            return Some(Suppression::Ignored);
        }
        if has_transient_suffix(path) {
            return Some(Suppression::Transient);
        }
        match path.extension() {
            Some(_) if self.filter.is_media(path) => None,
            Some(_) if self.fs.folder_exists(path).await => None,
            Some(_) => Some(Suppression::NotMedia),
            None if self.fs.folder_exists(path).await => None,
            None => Some(Suppression::NotADirectory),
        }
    }

    /// Drain the ledger and submit one known-files rescan for every root
    /// with a change that survived suppression.
    pub async fn flush(&self) -> Result<Vec<RescanRequest>> {
        let drained = self.ledger.drain();
        let mut roots = BTreeSet::new();

        for (path, root) in &drained.pending {
            match self.suppression(path, &drained.ignored).await {
                Some(reason) => {
                    trace!("Suppressed change {} ({:?})", path.display(), reason);
                }
                None => {
                    debug!("Change detected in {}", path.display());
                    roots.insert(root.clone());
                }
            }
        }

        let mut requests = Vec::with_capacity(roots.len());
        for root in roots {
            info!("Scheduling rescan of root folder {}", root.display());
            let request = RescanRequest::known_files(vec![root.clone()]);
            match self.scheduler.submit(request.clone()).await {
                Ok(()) => requests.push(request),
                Err(err) => {
                    error!(error = %err, "Failed to schedule rescan of {}", root.display());
                }
            }
        }
        Ok(requests)
    }
}

impl ChangeReporter for ScanTrigger {
    fn report_change_beginning(&self, paths: &[&Path]) {
        for path in paths {
            self.ledger.ignore(path);
        }
    }
}
