use chrono::{DateTime, Utc};
use curator_model::LibraryItem;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config::{FileDatePolicy, PermissionsConfig};
use crate::error::Result;
use crate::fs::FileSystem;

/// Applies configured permissions and timestamps to folders and files the
/// engine creates or relocates. Failures are logged, never raised: a file
/// that moved but kept its old mode is still a successful move.
#[derive(Clone)]
pub struct MediaFileAttributes {
    fs: Arc<dyn FileSystem>,
    permissions: PermissionsConfig,
    folder_mode: u32,
    file_mode: u32,
}

impl fmt::Debug for MediaFileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFileAttributes")
            .field("set_permissions", &self.permissions.set_permissions)
            .field("folder_mode", &format_args!("{:o}", self.folder_mode))
            .field("file_mode", &format_args!("{:o}", self.file_mode))
            .finish()
    }
}

impl MediaFileAttributes {
    pub fn new(fs: Arc<dyn FileSystem>, permissions: PermissionsConfig) -> Result<Self> {
        let folder_mode = permissions.folder_mode_bits()?;
        let file_mode = permissions.file_mode_bits()?;
        Ok(Self {
            fs,
            permissions,
            folder_mode,
            file_mode,
        })
    }

    pub async fn set_folder_permissions(&self, path: &Path) {
        if !self.permissions.set_permissions {
            return;
        }
        debug!("Setting permissions: {:o} on {}", self.folder_mode, path.display());
        if let Err(err) = self.fs.set_permissions(path, self.folder_mode).await {
            warn!(error = %err, "Unable to apply permissions to: {}", path.display());
        }
    }

    pub async fn set_file_permissions(&self, path: &Path) {
        if !self.permissions.set_permissions {
            return;
        }
        debug!("Setting permissions: {:o} on {}", self.file_mode, path.display());
        if let Err(err) = self.fs.set_permissions(path, self.file_mode).await {
            warn!(error = %err, "Unable to apply permissions to: {}", path.display());
        }
    }

    /// Best effort; some filesystems refuse directory timestamps.
    pub async fn set_folder_last_write_time(&self, path: &Path, time: DateTime<Utc>) {
        if let Err(err) = self.fs.set_modified(path, SystemTime::from(time)).await {
            warn!(error = %err, "Unable to set last write time on folder {}", path.display());
        }
    }

    /// Stamp `path` per `policy`. Returns the time written, if any.
    pub async fn apply_file_date(
        &self,
        path: &Path,
        item: &LibraryItem,
        policy: FileDatePolicy,
    ) -> Option<DateTime<Utc>> {
        let stamp = match policy {
            FileDatePolicy::None => return None,
            FileDatePolicy::ReleaseDate => item.release_date?,
        };
        match self.fs.set_modified(path, SystemTime::from(stamp)).await {
            Ok(()) => {
                debug!("Set date of {} to {}", path.display(), stamp);
                Some(stamp)
            }
            Err(err) => {
                warn!(error = %err, "Unable to set date of file {}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use chrono::TimeZone;
    use curator_model::ItemKind;

    #[tokio::test]
    async fn permissions_apply_only_when_enabled() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_dir("/lib/Artist");

        let disabled = MediaFileAttributes::new(fs.clone(), PermissionsConfig::default()).unwrap();
        disabled.set_folder_permissions(Path::new("/lib/Artist")).await;
        assert_eq!(fs.mode_of(Path::new("/lib/Artist")), None);

        let enabled = MediaFileAttributes::new(
            fs.clone(),
            PermissionsConfig {
                set_permissions: true,
                ..PermissionsConfig::default()
            },
        )
        .unwrap();
        enabled.set_folder_permissions(Path::new("/lib/Artist")).await;
        assert_eq!(fs.mode_of(Path::new("/lib/Artist")), Some(0o755));
    }

    #[tokio::test]
    async fn release_date_policy_stamps_the_file() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/lib/Alien (1979)/alien.mkv", 1, SystemTime::now());
        let attrs = MediaFileAttributes::new(fs.clone(), PermissionsConfig::default()).unwrap();

        let mut item = LibraryItem::new(ItemKind::Movie, "Alien", "/lib/Alien (1979)");
        let path = Path::new("/lib/Alien (1979)/alien.mkv");
        assert_eq!(attrs.apply_file_date(path, &item, FileDatePolicy::ReleaseDate).await, None);

        let release = Utc.with_ymd_and_hms(1979, 5, 25, 0, 0, 0).unwrap();
        item.release_date = Some(release);
        assert_eq!(
            attrs.apply_file_date(path, &item, FileDatePolicy::ReleaseDate).await,
            Some(release)
        );
        assert_eq!(attrs.apply_file_date(path, &item, FileDatePolicy::None).await, None);

        let md = fs.metadata(path).await.unwrap();
        assert_eq!(md.modified.map(DateTime::<Utc>::from), Some(release));
    }
}
