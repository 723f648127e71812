mod support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_core::events::EngineEvent;
use curator_core::fs::{FileSystem, InMemoryFs};
use curator_model::{
    DeleteMediaFileReason, FilterFilesType, RescanRequest, ScanOutcome, ScanSkippedReason,
};
use support::{MOVIES, drain_events, epoch_plus, file_row, in_memory_runtime, movie};

#[tokio::test]
async fn missing_root_skips_without_listing() {
    let fs = Arc::new(InMemoryFs::new());
    let runtime = in_memory_runtime(fs.clone(), |_| {});
    runtime.roots().add(MOVIES).await.unwrap();
    let item = movie("Alien", "Alien (1979)");
    runtime.add_item(&item).await.unwrap();
    runtime
        .catalog()
        .add(file_row(&item, "Alien.1979.mkv", 700))
        .await
        .unwrap();
    let mut events = runtime.events().subscribe();

    let outcome = runtime
        .scanner()
        .scan(&item, FilterFilesType::Known)
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::Skipped(ScanSkippedReason::RootFolderMissing));
    assert_eq!(fs.read_dir_calls(), 0);
    let events = drain_events(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        EngineEvent::ScanSkipped { reason: ScanSkippedReason::RootFolderMissing, .. }
    ));
    assert_eq!(runtime.catalog().files_for_item(item.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_root_is_treated_as_unmounted() {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_dir(MOVIES);
    let runtime = in_memory_runtime(fs, |_| {});
    runtime.roots().add(MOVIES).await.unwrap();
    let item = movie("Alien", "Alien (1979)");
    runtime
        .catalog()
        .add(file_row(&item, "Alien.1979.mkv", 700))
        .await
        .unwrap();

    let outcome = runtime
        .scanner()
        .scan(&item, FilterFilesType::Known)
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::Skipped(ScanSkippedReason::RootFolderEmpty));
    assert_eq!(runtime.catalog().files_for_item(item.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_item_folder_clears_rows_and_can_recreate_the_folder() {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_dir(format!("{MOVIES}/Aliens (1986)"));
    let runtime = in_memory_runtime(fs.clone(), |config| {
        config.library.create_empty_item_folders = true;
    });
    runtime.roots().add(MOVIES).await.unwrap();
    let item = movie("Alien", "Alien (1979)");
    let row = runtime
        .catalog()
        .add(file_row(&item, "Alien.1979.mkv", 700))
        .await
        .unwrap();
    let mut events = runtime.events().subscribe();

    let outcome = runtime
        .scanner()
        .scan(&item, FilterFilesType::Known)
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::Skipped(ScanSkippedReason::ItemFolderMissing));
    assert!(runtime.catalog().get(row.id).await.unwrap().is_none());
    assert!(fs.folder_exists(&item.path).await);

    let events = drain_events(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::MediaFileDeleted { reason: DeleteMediaFileReason::MissingFromDisk, .. }
    )));
}

#[tokio::test]
async fn externally_deleted_file_is_removed_and_the_scan_completes() {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_dir(format!("{MOVIES}/Alien (1979)"));
    let runtime = in_memory_runtime(fs, |_| {});
    runtime.roots().add(MOVIES).await.unwrap();
    let item = movie("Alien", "Alien (1979)");
    let row = runtime
        .catalog()
        .add(file_row(&item, "Alien.1979.mkv", 700))
        .await
        .unwrap();
    let mut events = runtime.events().subscribe();

    let outcome = runtime
        .scanner()
        .scan(&item, FilterFilesType::Known)
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::Scanned);
    assert!(runtime.catalog().get(row.id).await.unwrap().is_none());

    let events = drain_events(&mut events);
    let deleted: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::MediaFileDeleted { file, reason } => Some((file.id, *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(deleted, vec![(row.id, DeleteMediaFileReason::MissingFromDisk)]);
    assert!(matches!(events.last(), Some(EngineEvent::Scanned { item_id }) if *item_id == item.id));
}

#[tokio::test]
async fn new_files_are_added_and_drifted_rows_refreshed() {
    let fs = Arc::new(InMemoryFs::new());
    let folder = format!("{MOVIES}/Alien (1979)");
    fs.add_file(format!("{folder}/Alien.1979.mkv"), 800, epoch_plus(120));
    fs.add_file(format!("{folder}/Featurettes/Making.Of.mkv"), 50, epoch_plus(60));
    fs.add_file(format!("{folder}/Alien.1979.nfo"), 1, epoch_plus(60));
    let runtime = in_memory_runtime(fs, |_| {});
    runtime.roots().add(MOVIES).await.unwrap();
    let item = movie("Alien", "Alien (1979)");
    let known = runtime
        .catalog()
        .add(file_row(&item, "Alien.1979.mkv", 700))
        .await
        .unwrap();

    runtime
        .scanner()
        .scan(&item, FilterFilesType::Known)
        .await
        .unwrap();

    let mut files = runtime.catalog().files_for_item(item.id).await.unwrap();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    let paths: Vec<&Path> = files.iter().map(|file| file.path.as_path()).collect();
    assert_eq!(
        paths,
        vec![
            Path::new("/media/movies/Alien (1979)/Alien.1979.mkv"),
            Path::new("/media/movies/Alien (1979)/Featurettes/Making.Of.mkv"),
        ]
    );
    assert_eq!(files[0].id, known.id);
    assert_eq!(files[0].size, 800);
    assert_eq!(files[1].relative_path, PathBuf::from("Featurettes/Making.Of.mkv"));
    assert!(!files[1].matched);
}

#[tokio::test]
async fn unchanged_files_are_not_touched_on_rescan() {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_file(format!("{MOVIES}/Alien (1979)/Alien.1979.mkv"), 700, epoch_plus(60));
    let runtime = in_memory_runtime(fs, |_| {});
    runtime.roots().add(MOVIES).await.unwrap();
    let item = movie("Alien", "Alien (1979)");

    runtime.scanner().scan(&item, FilterFilesType::Known).await.unwrap();
    let mut events = runtime.events().subscribe();
    runtime.scanner().scan(&item, FilterFilesType::Known).await.unwrap();

    let events = drain_events(&mut events);
    assert!(events.iter().all(|event| matches!(event, EngineEvent::Scanned { .. })));
    assert_eq!(runtime.catalog().files_for_item(item.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_folders_are_removed_when_enabled() {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_file(format!("{MOVIES}/Alien (1979)/Alien.1979.mkv"), 700, epoch_plus(60));
    fs.add_dir(format!("{MOVIES}/Alien (1979)/Extras/Empty"));
    fs.add_dir(format!("{MOVIES}/Prometheus (2012)/Subs"));
    let runtime = in_memory_runtime(fs.clone(), |config| {
        config.library.delete_empty_folders = true;
    });
    runtime.roots().add(MOVIES).await.unwrap();
    let alien = movie("Alien", "Alien (1979)");
    let prometheus = movie("Prometheus", "Prometheus (2012)");

    runtime.scanner().scan(&alien, FilterFilesType::Known).await.unwrap();
    runtime.scanner().scan(&prometheus, FilterFilesType::Known).await.unwrap();

    assert!(fs.folder_exists(&alien.path).await);
    assert!(!fs.folder_exists(&alien.path.join("Extras")).await);
    assert!(!fs.folder_exists(&prometheus.path).await);
}

#[tokio::test]
async fn overlapping_roots_scan_each_item_once() {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_file(format!("{MOVIES}/Alien (1979)/Alien.1979.mkv"), 700, epoch_plus(60));
    fs.add_file(format!("{MOVIES}/Aliens (1986)/Aliens.1986.mkv"), 900, epoch_plus(60));
    let runtime = in_memory_runtime(fs, |_| {});
    runtime.roots().add(MOVIES).await.unwrap();
    runtime.add_item(&movie("Alien", "Alien (1979)")).await.unwrap();
    runtime.add_item(&movie("Aliens", "Aliens (1986)")).await.unwrap();

    let summary = runtime
        .executor()
        .execute(RescanRequest::known_files(vec![MOVIES.into(), MOVIES.into()]))
        .await
        .unwrap();

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.coalesced, 0);
    assert_eq!(summary.failed, 0);
}
