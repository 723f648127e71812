use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::fs::normalize_path;

/// Changes collected between two flushes, taken out in one step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainedChanges {
    /// `(changed path, owning root)`; one entry per path.
    pub pending: Vec<(PathBuf, PathBuf)>,
    /// Paths the engine announced it was about to touch.
    pub ignored: Vec<PathBuf>,
}

#[derive(Default)]
struct LedgerState {
    pending: HashMap<PathBuf, PathBuf>,
    ignored: HashMap<PathBuf, u32>,
}

/// Pending changes and ignore registrations shared between notify callback
/// threads, the relocator and the single flush task.
///
/// Both tables are cleared by [`ChangeLedger::drain`] whatever the ignore
/// counts say: an ignore registration lives for one debounce cycle.
#[derive(Default)]
pub struct ChangeLedger {
    state: Mutex<LedgerState>,
}

impl fmt::Debug for ChangeLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ChangeLedger")
            .field("pending", &state.pending.len())
            .field("ignored", &state.ignored.len())
            .finish()
    }
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change. The first root recorded for a path wins.
    pub fn record_change(&self, path: &Path, root: &Path) {
        self.state
            .lock()
            .pending
            .entry(normalize_path(path))
            .or_insert_with(|| root.to_path_buf());
    }

    /// Register a path the engine is about to mutate.
    pub fn ignore(&self, path: &Path) {
        *self
            .state
            .lock()
            .ignored
            .entry(normalize_path(path))
            .or_insert(0) += 1;
    }

    pub fn ignore_count(&self, path: &Path) -> u32 {
        self.state
            .lock()
            .ignored
            .get(&normalize_path(path))
            .copied()
            .unwrap_or(0)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Take both tables atomically, leaving them empty.
    pub fn drain(&self) -> DrainedChanges {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);
        let ignored = std::mem::take(&mut state.ignored);
        drop(state);

        let mut pending: Vec<(PathBuf, PathBuf)> = pending.into_iter().collect();
        pending.sort();
        let mut ignored: Vec<PathBuf> = ignored.into_keys().collect();
        ignored.sort();
        DrainedChanges { pending, ignored }
    }
}
