//! Assembles the engine from its repositories and collaborators and runs the
//! background tasks: the rescan executor, the debounced scan trigger and,
//! with `fs-watch`, the root-folder watch service.

use curator_model::{LibraryItem, RescanRequest};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attributes::MediaFileAttributes;
use crate::catalog::{
    CatalogStore, InMemoryLibraryItemRepository, InMemoryMediaFileRepository,
    InMemoryRootFolderRepository, LibraryItemRepository, MediaFileRepository,
    RootFolderRepository, RootFolderService,
};
use crate::collaborators::{
    AcceptAllDecisions, CatalogOnlyImporter, ChannelRescanScheduler, FileNameBuilder,
    FlatFileNames, ImportDecisionMaker, Importer, RescanScheduler,
};
use crate::config::EngineConfig;
use crate::error::{MediaError, Result};
use crate::events::{EventPublisher, InProcEventBus};
use crate::fs::{FileSystem, RealFs};
#[cfg(feature = "fs-watch")]
use crate::fs_watch::RootFolderWatchService;
use crate::fs_watch::ScanTrigger;
use crate::relocate::{FileTransfer, LocalTransfer, RelocatorDeps, RenameService, Relocator};
use crate::scan::{PathFilter, RescanExecutor, RescanSummary, Scanner, ScannerDeps};

/// Storage behind the catalog.
#[derive(Clone)]
pub struct EngineRepositories {
    pub files: Arc<dyn MediaFileRepository>,
    pub items: Arc<dyn LibraryItemRepository>,
    pub roots: Arc<dyn RootFolderRepository>,
}

impl fmt::Debug for EngineRepositories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRepositories").finish_non_exhaustive()
    }
}

impl EngineRepositories {
    pub fn in_memory() -> Self {
        Self {
            files: Arc::new(InMemoryMediaFileRepository::new()),
            items: Arc::new(InMemoryLibraryItemRepository::new()),
            roots: Arc::new(InMemoryRootFolderRepository::new()),
        }
    }

    #[cfg(feature = "database")]
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        use crate::catalog::{
            PostgresLibraryItemRepository, PostgresMediaFileRepository,
            PostgresRootFolderRepository,
        };
        Self {
            files: Arc::new(PostgresMediaFileRepository::new(pool.clone())),
            items: Arc::new(PostgresLibraryItemRepository::new(pool.clone())),
            roots: Arc::new(PostgresRootFolderRepository::new(pool)),
        }
    }
}

/// Pluggable parts the engine drives but does not implement itself.
#[derive(Clone)]
pub struct RuntimeCollaborators {
    pub fs: Arc<dyn FileSystem>,
    pub transfer: Arc<dyn FileTransfer>,
    pub decisions: Arc<dyn ImportDecisionMaker>,
    pub importer: Arc<dyn Importer>,
    pub naming: Arc<dyn FileNameBuilder>,
}

impl fmt::Debug for RuntimeCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeCollaborators").finish_non_exhaustive()
    }
}

impl Default for RuntimeCollaborators {
    fn default() -> Self {
        Self {
            fs: Arc::new(RealFs::new()),
            transfer: Arc::new(LocalTransfer::new()),
            decisions: Arc::new(AcceptAllDecisions),
            importer: Arc::new(CatalogOnlyImporter),
            naming: Arc::new(FlatFileNames),
        }
    }
}

/// Handles of the tasks spawned by [`LibraryRuntime::start`].
#[derive(Debug, Default)]
pub struct RuntimeTasks {
    handles: Vec<JoinHandle<()>>,
}

impl RuntimeTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every task to finish. Cancel the token first.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Runtime task ended abnormally");
            }
        }
    }
}

/// The running engine.
pub struct LibraryRuntime {
    config: EngineConfig,
    events: Arc<InProcEventBus>,
    items: Arc<dyn LibraryItemRepository>,
    catalog: Arc<CatalogStore>,
    roots: RootFolderService,
    scanner: Arc<Scanner>,
    executor: Arc<RescanExecutor>,
    scheduler: Arc<ChannelRescanScheduler>,
    requests: Mutex<Option<mpsc::Receiver<RescanRequest>>>,
    trigger: Arc<ScanTrigger>,
    relocator: Arc<Relocator>,
    renames: Arc<RenameService>,
    #[cfg(feature = "fs-watch")]
    watch: Arc<RootFolderWatchService>,
}

impl fmt::Debug for LibraryRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryRuntime")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl LibraryRuntime {
    pub fn build(
        config: EngineConfig,
        repos: EngineRepositories,
        collaborators: RuntimeCollaborators,
    ) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(InProcEventBus::default());
        let publisher: Arc<dyn EventPublisher> = events.clone();
        let fs = collaborators.fs.clone();
        let attributes = MediaFileAttributes::new(fs.clone(), config.permissions.clone())?;

        let catalog = Arc::new(CatalogStore::new(repos.files.clone(), publisher.clone()));
        let roots = RootFolderService::new(repos.roots.clone(), publisher.clone());

        let scanner = Arc::new(Scanner::new(
            ScannerDeps {
                fs: fs.clone(),
                catalog: catalog.clone(),
                roots: repos.roots.clone(),
                decisions: collaborators.decisions.clone(),
                importer: collaborators.importer.clone(),
                events: publisher.clone(),
                attributes: attributes.clone(),
            },
            config.library.clone(),
        ));
        let executor = Arc::new(RescanExecutor::new(
            scanner.clone(),
            repos.items.clone(),
            config.executor.max_parallel_scans,
        ));

        let (scheduler, requests) =
            ChannelRescanScheduler::channel(config.executor.queue_capacity.max(1));
        let scheduler = Arc::new(scheduler);
        let trigger = Arc::new(ScanTrigger::new(
            &config.watch,
            PathFilter::new(&config.library.media_extensions),
            fs.clone(),
            scheduler.clone(),
        ));

        let relocator = Arc::new(Relocator::new(
            RelocatorDeps {
                fs,
                transfer: collaborators.transfer,
                catalog: catalog.clone(),
                naming: collaborators.naming,
                reporter: trigger.clone(),
                events: publisher.clone(),
                attributes,
            },
            config.relocation.clone(),
        ));
        let renames = Arc::new(RenameService::new(
            relocator.clone(),
            catalog.clone(),
            publisher,
        ));

        #[cfg(feature = "fs-watch")]
        let watch = Arc::new(RootFolderWatchService::new(
            trigger.clone(),
            config.watch.restart,
        ));

        Ok(Self {
            config,
            events,
            items: repos.items,
            catalog,
            roots,
            scanner,
            executor,
            scheduler,
            requests: Mutex::new(Some(requests)),
            trigger,
            relocator,
            renames,
            #[cfg(feature = "fs-watch")]
            watch,
        })
    }

    /// Spawn the background tasks. Watches start for every registered root
    /// when watching is enabled. Fails if called twice.
    pub async fn start(&self, cancel: CancellationToken) -> Result<RuntimeTasks> {
        let requests = self
            .requests
            .lock()
            .take()
            .ok_or_else(|| MediaError::Conflict("runtime already started".into()))?;

        let mut tasks = RuntimeTasks::default();
        tasks
            .handles
            .push(self.executor.clone().spawn(requests, cancel.clone()));
        tasks.handles.push(self.trigger.start(cancel.clone()));

        #[cfg(feature = "fs-watch")]
        {
            tasks.handles.push(self.watch.start(cancel.clone()));
            if self.config.watch.enabled {
                tasks.handles.push(
                    self.watch
                        .spawn_root_folder_listener(self.events.subscribe(), cancel.clone()),
                );
            }
            let roots = self.roots.all().await?;
            self.watch.apply_watch_setting(self.config.watch.enabled, &roots);
        }

        info!("Library runtime started with {} background tasks", tasks.len());
        Ok(tasks)
    }

    /// Queue a rescan for the executor.
    pub async fn request_rescan(&self, request: RescanRequest) -> Result<()> {
        self.scheduler.submit(request).await
    }

    /// Rescan every registered root in the caller's task.
    pub async fn rescan_all(&self, force_full_rescan: bool) -> Result<RescanSummary> {
        let roots = self.roots.all().await?;
        let mut request =
            RescanRequest::known_files(roots.into_iter().map(|root| root.path).collect());
        request.force_full_rescan = force_full_rescan;
        debug!("Rescanning {} root folders", request.roots.len());
        self.executor.execute(request).await
    }

    /// Register `item` in the library.
    pub async fn add_item(&self, item: &LibraryItem) -> Result<()> {
        self.items.upsert(item).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<InProcEventBus> {
        &self.events
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn roots(&self) -> &RootFolderService {
        &self.roots
    }

    pub fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    pub fn executor(&self) -> &Arc<RescanExecutor> {
        &self.executor
    }

    pub fn trigger(&self) -> &Arc<ScanTrigger> {
        &self.trigger
    }

    pub fn relocator(&self) -> &Arc<Relocator> {
        &self.relocator
    }

    pub fn renames(&self) -> &Arc<RenameService> {
        &self.renames
    }

    #[cfg(feature = "fs-watch")]
    pub fn watch(&self) -> &Arc<RootFolderWatchService> {
        &self.watch
    }

    /// Stop watching. Background tasks end when their token is cancelled.
    pub fn shutdown(&self) {
        #[cfg(feature = "fs-watch")]
        self.watch.shutdown();
        info!("Library runtime shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::events::EngineEvent;
    use curator_model::{ItemKind, MediaFile, ScanSkippedReason};
    use std::path::Path;
    use std::time::SystemTime;

    fn in_memory_runtime(fs: Arc<InMemoryFs>, watch_enabled: bool) -> LibraryRuntime {
        let mut config = EngineConfig::default();
        config.watch.enabled = watch_enabled;
        LibraryRuntime::build(
            config,
            EngineRepositories::in_memory(),
            RuntimeCollaborators {
                fs,
                ..RuntimeCollaborators::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let mut config = EngineConfig::default();
        config.executor.max_parallel_scans = 0;
        let err = LibraryRuntime::build(
            config,
            EngineRepositories::in_memory(),
            RuntimeCollaborators::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::Internal(_)));
    }

    #[tokio::test]
    async fn rescan_all_catalogues_new_files() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_dir("/media/movies/Alien (1979)");
        fs.add_file("/media/movies/Alien (1979)/Alien.1979.mkv", 700, SystemTime::now());
        fs.add_file("/media/movies/Alien (1979)/notes.txt", 1, SystemTime::now());

        let runtime = in_memory_runtime(fs, false);
        runtime.roots().add("/media/movies").await.unwrap();
        let item = LibraryItem::new(ItemKind::Movie, "Alien", "/media/movies/Alien (1979)");
        runtime.add_item(&item).await.unwrap();

        let summary = runtime.rescan_all(false).await.unwrap();
        assert_eq!(summary.scanned, 1);

        let files = runtime.catalog().files_for_item(item.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].path,
            Path::new("/media/movies/Alien (1979)/Alien.1979.mkv")
        );
    }

    #[tokio::test]
    async fn queued_rescans_reach_the_executor() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_dir("/media/movies");

        let runtime = in_memory_runtime(fs, false);
        runtime.roots().add("/media/movies").await.unwrap();
        let item = LibraryItem::new(ItemKind::Movie, "Alien", "/media/movies/Alien (1979)");
        runtime.add_item(&item).await.unwrap();
        let mut events = runtime.events().subscribe();

        let cancel = CancellationToken::new();
        let tasks = runtime.start(cancel.clone()).await.unwrap();
        runtime
            .request_rescan(RescanRequest::known_files(vec!["/media/movies".into()]))
            .await
            .unwrap();

        loop {
            match events.recv().await.unwrap() {
                EngineEvent::ScanSkipped { item_id, reason } => {
                    assert_eq!(item_id, item.id);
                    assert_eq!(reason, ScanSkippedReason::RootFolderEmpty);
                    break;
                }
                _ => continue,
            }
        }

        cancel.cancel();
        tasks.join().await;
    }

    #[tokio::test]
    async fn start_twice_is_a_conflict() {
        let runtime = in_memory_runtime(Arc::new(InMemoryFs::new()), false);
        let cancel = CancellationToken::new();
        let tasks = runtime.start(cancel.clone()).await.unwrap();

        let err = runtime.start(cancel.clone()).await.unwrap_err();
        assert!(matches!(err, MediaError::Conflict(_)));

        cancel.cancel();
        tasks.join().await;
    }

    #[tokio::test]
    async fn relocations_are_announced_to_the_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("movies");
        let downloads = dir.path().join("downloads");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&downloads).unwrap();
        let source = downloads.join("alien.mkv");
        std::fs::write(&source, b"alien").unwrap();

        let mut config = EngineConfig::default();
        config.watch.enabled = false;
        let runtime = LibraryRuntime::build(
            config,
            EngineRepositories::in_memory(),
            RuntimeCollaborators::default(),
        )
        .unwrap();
        let item = LibraryItem::new(ItemKind::Movie, "Alien", root.join("Alien (1979)"));
        let file = MediaFile::new(
            item.id,
            &item.path,
            source.clone(),
            5,
            chrono::Utc::now(),
        );

        let outcome = runtime.relocator().move_file(file, &item).await.unwrap();

        assert_eq!(outcome.file.path, item.path.join("alien.mkv"));
        let ledger = runtime.trigger().ledger();
        assert_eq!(ledger.ignore_count(&source), 1);
        assert_eq!(ledger.ignore_count(&item.path.join("alien.mkv")), 1);
    }
}
