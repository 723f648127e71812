use curator_model::RootFolder;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use notify::event::EventKind;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::trigger::ScanTrigger;
use crate::config::RestartPolicy;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::fs::normalize_path;

/// A watcher that died, reported from the notify thread or from the
/// background task that tried to create it.
#[derive(Debug)]
struct WatchFailure {
    root: PathBuf,
    generation: u64,
    message: String,
}

struct WatchHandle {
    root: PathBuf,
    generation: u64,
    /// Cleared before the watcher is dropped so late callbacks are ignored.
    active: Arc<AtomicBool>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    restart_attempt: AtomicU32,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("generation", &self.generation)
            .field("active", &self.active.load(Ordering::Acquire))
            .field("started", &self.watcher.lock().is_some())
            .finish()
    }
}

impl WatchHandle {
    fn new(root: PathBuf, generation: u64, restart_attempt: u32) -> Self {
        Self {
            root,
            generation,
            active: Arc::new(AtomicBool::new(true)),
            watcher: Mutex::new(None),
            restart_attempt: AtomicU32::new(restart_attempt),
        }
    }

    /// Store the watcher built in the background. Returns `false` when the
    /// handle was disposed in the meantime; the watcher is then dropped.
    fn install(&self, watcher: RecommendedWatcher) -> bool {
        let mut slot = self.watcher.lock();
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        *slot = Some(watcher);
        self.restart_attempt.store(0, Ordering::Release);
        true
    }

    /// Detach the callback, then drop the watcher. Safe to call repeatedly;
    /// only the first call after install drops anything.
    fn dispose(&self) -> bool {
        self.active.store(false, Ordering::Release);
        let watcher = self.watcher.lock().take();
        watcher.is_some()
    }
}

/// Whether a notification means the OS dropped events for this root.
fn is_overflow(event: &Event) -> bool {
    event.need_rescan() || matches!(event.kind, EventKind::Other)
}

fn is_overflow_error(err: &notify::Error) -> bool {
    matches!(&err.kind, notify::ErrorKind::Generic(msg) if msg.to_ascii_lowercase().contains("overflow"))
}

/// Route one notify callback into the trigger. Returns the message of a
/// fatal watcher error; overflow is not fatal and falls back to the root.
pub(crate) fn handle_notification(
    trigger: &ScanTrigger,
    root: &Path,
    result: notify::Result<Event>,
) -> Option<String> {
    match result {
        Ok(event) if is_overflow(&event) => {
            warn!("Watch buffer overflowed for {}, rescanning root", root.display());
            trigger.record_change(root, root);
            None
        }
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return None;
            }
            for path in event.paths.iter().filter(|path| path.starts_with(root)) {
                trigger.record_change(path, root);
            }
            None
        }
        Err(err) if is_overflow_error(&err) => {
            warn!(error = %err, "Watch buffer overflowed for {}, rescanning root", root.display());
            trigger.record_change(root, root);
            None
        }
        Err(err) => Some(err.to_string()),
    }
}

fn create_watcher(
    root: PathBuf,
    generation: u64,
    active: Arc<AtomicBool>,
    trigger: Arc<ScanTrigger>,
    failures: mpsc::UnboundedSender<WatchFailure>,
) -> Result<RecommendedWatcher> {
    let callback_root = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if !active.load(Ordering::Acquire) {
                return;
            }
            if let Some(message) = handle_notification(&trigger, &callback_root, res) {
                active.store(false, Ordering::Release);
                let _ = failures.send(WatchFailure {
                    root: callback_root.clone(),
                    generation,
                    message,
                });
            }
        },
        NotifyConfig::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Keeps one live notify watch per root folder and feeds every notification
/// into the [`ScanTrigger`].
pub struct RootFolderWatchService {
    trigger: Arc<ScanTrigger>,
    restart: RestartPolicy,
    watches: DashMap<PathBuf, Arc<WatchHandle>>,
    /// Roots waiting out a restart delay, keyed to the failed generation.
    pending_restarts: DashMap<PathBuf, u64>,
    next_generation: AtomicU64,
    failures_tx: mpsc::UnboundedSender<WatchFailure>,
    failures_rx: Mutex<Option<mpsc::UnboundedReceiver<WatchFailure>>>,
}

impl fmt::Debug for RootFolderWatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootFolderWatchService")
            .field("restart", &self.restart)
            .field("watch_count", &self.watches.len())
            .field("pending_restarts", &self.pending_restarts.len())
            .field("trigger", &self.trigger)
            .finish()
    }
}

impl RootFolderWatchService {
    pub fn new(trigger: Arc<ScanTrigger>, restart: RestartPolicy) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            trigger,
            restart,
            watches: DashMap::new(),
            pending_restarts: DashMap::new(),
            next_generation: AtomicU64::new(1),
            failures_tx,
            failures_rx: Mutex::new(Some(failures_rx)),
        }
    }

    pub fn trigger(&self) -> &Arc<ScanTrigger> {
        &self.trigger
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.watches.contains_key(&normalize_path(root))
    }

    /// Whether the watch for `root` has a live notify watcher installed.
    /// `false` while the watcher is still being built in the background.
    pub fn is_started(&self, root: &Path) -> bool {
        self.watches
            .get(&normalize_path(root))
            .is_some_and(|handle| handle.watcher.lock().is_some())
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.watches.iter().map(|entry| entry.key().clone()).collect();
        roots.sort();
        roots
    }

    /// Register a watch for `root`. The notify watcher is built on the
    /// blocking pool so a slow mount never stalls the caller. Returns `false`
    /// when the root already has a watch.
    pub fn start_watching(&self, root: &Path) -> bool {
        self.start_watching_attempt(root, 0)
    }

    fn start_watching_attempt(&self, root: &Path, restart_attempt: u32) -> bool {
        let root = normalize_path(root);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let handle = match self.watches.entry(root.clone()) {
            Entry::Occupied(_) => {
                debug!("Already watching {}", root.display());
                return false;
            }
            Entry::Vacant(slot) => {
                let handle = Arc::new(WatchHandle::new(root.clone(), generation, restart_attempt));
                slot.insert(Arc::clone(&handle));
                handle
            }
        };

        let trigger = Arc::clone(&self.trigger);
        let failures = self.failures_tx.clone();

        tokio::spawn(async move {
            let active = Arc::clone(&handle.active);
            let build_root = root.clone();
            let build_failures = failures.clone();
            let build_result = spawn_blocking(move || {
                create_watcher(build_root, generation, active, trigger, build_failures)
            })
            .await;

            let message = match build_result {
                Ok(Ok(watcher)) => {
                    if handle.install(watcher) {
                        info!("Watching root folder {}", root.display());
                    } else {
                        debug!("Watch for {} was stopped before it started", root.display());
                    }
                    return;
                }
                Ok(Err(err)) => err.to_string(),
                Err(join_err) => format!("watcher initialization panicked: {join_err}"),
            };

            warn!(error = %message, "Unable to watch root folder {}", root.display());
            let _ = failures.send(WatchFailure {
                root,
                generation,
                message,
            });
        });

        true
    }

    /// Whether a failed watch on `root` is waiting to be restarted.
    pub fn is_restart_pending(&self, root: &Path) -> bool {
        self.pending_restarts.contains_key(&normalize_path(root))
    }

    /// Dispose and forget the watch for `root`, cancelling any pending
    /// restart of it.
    pub fn stop_watching(&self, root: &Path) -> bool {
        let root = normalize_path(root);
        let cancelled = self.pending_restarts.remove(&root).is_some();
        if cancelled {
            debug!("Cancelled pending restart of watch on {}", root.display());
        }
        match self.watches.remove(&root) {
            Some((root, handle)) => {
                handle.dispose();
                info!("Stopped watching root folder {}", root.display());
                true
            }
            None => cancelled,
        }
    }

    pub fn start_all(&self, roots: &[RootFolder]) -> usize {
        roots
            .iter()
            .filter(|root| self.start_watching(&root.path))
            .count()
    }

    pub fn stop_all(&self) {
        self.pending_restarts.clear();
        let roots: Vec<PathBuf> = self.watches.iter().map(|entry| entry.key().clone()).collect();
        for root in roots {
            self.stop_watching(&root);
        }
    }

    /// React to the watch switch being toggled at runtime.
    pub fn apply_watch_setting(&self, enabled: bool, roots: &[RootFolder]) {
        if enabled {
            let started = self.start_all(roots);
            debug!("Watching enabled, {} new root folder watches", started);
        } else {
            info!("Watching disabled, stopping {} root folder watches", self.watches.len());
            self.stop_all();
        }
    }

    /// Drain watcher failures until `cancel` fires, then stop every watch.
    /// Only the first call takes the failure channel.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let failures = self.failures_rx.lock().take();
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let Some(mut failures) = failures else {
                warn!("Watch supervisor is already running");
                return;
            };

            loop {
                let failure = tokio::select! {
                    _ = cancel.cancelled() => break,
                    failure = failures.recv() => match failure {
                        Some(failure) => failure,
                        None => break,
                    },
                };
                service.handle_failure(failure, &cancel);
            }

            service.stop_all();
            debug!("Watch supervisor stopped");
        })
    }

    fn handle_failure(self: &Arc<Self>, failure: WatchFailure, cancel: &CancellationToken) {
        let removed = self
            .watches
            .remove_if(&failure.root, |_, handle| handle.generation == failure.generation);
        let Some((root, handle)) = removed else {
            trace!("Ignoring failure of a replaced watch on {}", failure.root.display());
            return;
        };
        handle.dispose();
        error!(error = %failure.message, "Watch on {} failed and was disposed", root.display());

        let attempt = handle.restart_attempt.load(Ordering::Acquire) + 1;
        let Some(delay) = self.restart.delay_for(attempt) else {
            warn!(
                "{} is no longer watched; re-add the root folder or restart to resume",
                root.display()
            );
            return;
        };

        info!(
            "Restarting watch on {} in {:?} (attempt {})",
            root.display(),
            delay,
            attempt
        );
        let generation = failure.generation;
        self.pending_restarts.insert(root.clone(), generation);
        let service = Arc::clone(self);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    service.pending_restarts.remove_if(&root, |_, pending| *pending == generation);
                }
                _ = tokio::time::sleep(delay) => {
                    let still_pending = service
                        .pending_restarts
                        .remove_if(&root, |_, pending| *pending == generation)
                        .is_some();
                    if still_pending {
                        service.start_watching_attempt(&root, attempt);
                    } else {
                        debug!("Watch on {} was stopped during its restart delay", root.display());
                    }
                }
            }
        });
    }

    /// Start and stop watches as root folders are added and removed.
    pub fn spawn_root_folder_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<EngineEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(EngineEvent::RootFolderAdded { root }) => {
                        service.start_watching(&root.path);
                    }
                    Ok(EngineEvent::RootFolderRemoved { root }) => {
                        service.stop_watching(&root.path);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Root folder listener missed {} engine events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Stop every watch. Safe to call more than once.
    pub fn shutdown(&self) {
        self.stop_all();
    }
}
