//! Runtime settings for the engine. Loading and layering live in
//! `curator-config`; these are the plain typed sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MediaError, Result};
use crate::scan::path_filter::default_media_extensions;

/// All engine sections in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub library: LibraryConfig,
    pub watch: WatchConfig,
    pub relocation: RelocationConfig,
    pub permissions: PermissionsConfig,
    pub executor: ExecutorConfig,
}

impl EngineConfig {
    /// Reject values that would only fail later at the point of use.
    pub fn validate(&self) -> Result<()> {
        self.permissions.folder_mode_bits()?;
        self.permissions.file_mode_bits()?;
        if self.watch.debounce_window_ms == 0 {
            return Err(MediaError::Internal(
                "watch.debounce_window_ms must be greater than zero".into(),
            ));
        }
        if self.executor.max_parallel_scans == 0 {
            return Err(MediaError::Internal(
                "executor.max_parallel_scans must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Scanner behaviour for item folders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Create the item folder when a scan finds it missing.
    pub create_empty_item_folders: bool,
    /// Remove item folders (or empty sub-folders) left behind after a scan.
    pub delete_empty_folders: bool,
    /// Lowercase extensions, without the dot, counted as media.
    pub media_extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            create_empty_item_folders: false,
            delete_empty_folders: false,
            media_extensions: default_media_extensions(),
        }
    }
}

/// Filesystem watch and debounce tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Master switch for live root-folder watching.
    pub enabled: bool,
    /// Quiet period after the last change before a rescan is requested.
    pub debounce_window_ms: u64,
    /// Upper bound on how long a continuous burst can hold off a rescan.
    /// `None` keeps extending the deadline for as long as changes arrive.
    pub max_debounce_ms: Option<u64>,
    /// What to do after a watcher dies on a non-overflow error.
    pub restart: RestartPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_window_ms: 30_000,
            max_debounce_ms: None,
            restart: RestartPolicy::Never,
        }
    }
}

impl WatchConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn max_debounce(&self) -> Option<Duration> {
        self.max_debounce_ms.map(Duration::from_millis)
    }
}

/// Restart behaviour for watchers torn down after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Leave the root unwatched until it is re-added or the process restarts.
    #[default]
    Never,
    /// Re-create the watcher with exponential backoff.
    Backoff {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        max_attempts: u32,
    },
}

impl RestartPolicy {
    /// Delay before restart attempt `attempt` (1-based), or `None` once the
    /// policy gives up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            RestartPolicy::Never => None,
            RestartPolicy::Backoff {
                initial_delay_ms,
                max_delay_ms,
                max_attempts,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return None;
                }
                let factor = 1u64 << (attempt - 1).min(16);
                let delay = initial_delay_ms.saturating_mul(factor).min(max_delay_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }
}

/// How a relocated file's last-write time is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDatePolicy {
    /// Leave the timestamp produced by the transfer.
    #[default]
    None,
    /// Stamp the file with the owning item's release date.
    ReleaseDate,
}

/// Relocation behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelocationConfig {
    /// Copies try a hardlink first and fall back to a byte copy.
    pub copy_using_hardlinks: bool,
    pub file_date: FileDatePolicy,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            copy_using_hardlinks: true,
            file_date: FileDatePolicy::None,
        }
    }
}

/// Unix permissions applied to created folders and relocated files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionsConfig {
    pub set_permissions: bool,
    /// Octal mode string, e.g. "755".
    pub folder_mode: String,
    /// Octal mode string, e.g. "644".
    pub file_mode: String,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            set_permissions: false,
            folder_mode: "755".into(),
            file_mode: "644".into(),
        }
    }
}

impl PermissionsConfig {
    pub fn folder_mode_bits(&self) -> Result<u32> {
        parse_mode(&self.folder_mode)
    }

    pub fn file_mode_bits(&self) -> Result<u32> {
        parse_mode(&self.file_mode)
    }
}

fn parse_mode(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let bits = u32::from_str_radix(trimmed, 8)
        .map_err(|err| MediaError::Internal(format!("invalid permission mode '{raw}': {err}")))?;
    if bits > 0o7777 {
        return Err(MediaError::Internal(format!(
            "permission mode '{raw}' is out of range"
        )));
    }
    Ok(bits)
}

/// Rescan executor limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Library items scanned concurrently per rescan request.
    pub max_parallel_scans: usize,
    /// Buffered rescan requests before the trigger waits.
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_scans: 4,
            queue_capacity: 64,
        }
    }
}
