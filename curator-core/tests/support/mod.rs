#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use curator_core::config::EngineConfig;
use curator_core::events::EngineEvent;
use curator_core::fs::InMemoryFs;
use curator_core::runtime::{EngineRepositories, LibraryRuntime, RuntimeCollaborators};
use curator_model::{ItemKind, LibraryItem, MediaFile};
use tokio::sync::broadcast;

pub const MOVIES: &str = "/media/movies";

/// Runtime over an in-memory filesystem and in-memory repositories, with
/// watching off.
pub fn in_memory_runtime(
    fs: Arc<InMemoryFs>,
    configure: impl FnOnce(&mut EngineConfig),
) -> LibraryRuntime {
    let mut config = EngineConfig::default();
    config.watch.enabled = false;
    configure(&mut config);
    LibraryRuntime::build(
        config,
        EngineRepositories::in_memory(),
        RuntimeCollaborators {
            fs,
            ..RuntimeCollaborators::default()
        },
    )
    .expect("runtime builds")
}

/// Runtime over the real filesystem, for tests that work in a tempdir.
pub fn disk_runtime(configure: impl FnOnce(&mut EngineConfig)) -> LibraryRuntime {
    disk_runtime_with(configure, RuntimeCollaborators::default())
}

pub fn disk_runtime_with(
    configure: impl FnOnce(&mut EngineConfig),
    collaborators: RuntimeCollaborators,
) -> LibraryRuntime {
    let mut config = EngineConfig::default();
    config.watch.enabled = false;
    configure(&mut config);
    LibraryRuntime::build(config, EngineRepositories::in_memory(), collaborators)
        .expect("runtime builds")
}

pub fn movie(title: &str, folder: &str) -> LibraryItem {
    LibraryItem::new(ItemKind::Movie, title, format!("{MOVIES}/{folder}"))
}

pub fn file_row(item: &LibraryItem, name: &str, size: u64) -> MediaFile {
    MediaFile::new(
        item.id,
        &item.path,
        item.path.join(name),
        size,
        chrono::DateTime::<chrono::Utc>::from(epoch_plus(60)),
    )
}

pub fn epoch_plus(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
}

/// Everything published so far, without waiting.
pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check().await
}
