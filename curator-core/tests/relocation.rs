mod support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_core::MediaError;
use curator_core::collaborators::FileNameBuilder;
use curator_core::events::EngineEvent;
use curator_core::relocate::TransferMode;
use curator_core::runtime::{LibraryRuntime, RuntimeCollaborators};
use curator_model::{DeleteMediaFileReason, ItemKind, LibraryItem, MediaFile};
use support::{disk_runtime, disk_runtime_with, drain_events};
use tempfile::TempDir;

struct Library {
    _dir: TempDir,
    root: PathBuf,
    downloads: PathBuf,
}

fn library() -> Library {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("movies");
    let downloads = dir.path().join("downloads");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(&downloads).unwrap();
    Library {
        _dir: dir,
        root,
        downloads,
    }
}

fn download(lib: &Library, item: &LibraryItem, name: &str) -> MediaFile {
    let path = lib.downloads.join(name);
    std::fs::write(&path, name.as_bytes()).unwrap();
    MediaFile::new(
        item.id,
        &item.path,
        path,
        name.len() as u64,
        chrono::Utc::now(),
    )
}

async fn catalogued(runtime: &LibraryRuntime, file: MediaFile) -> MediaFile {
    runtime.catalog().add(file).await.unwrap()
}

#[tokio::test]
async fn move_leaves_one_row_at_the_new_path() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    let file = catalogued(&runtime, download(&lib, &item, "Alien.1979.mkv")).await;
    let source = file.path.clone();

    // A stale row already claims the destination.
    let stale = MediaFile::new(
        item.id,
        &item.path,
        item.path.join("Alien.1979.mkv"),
        1,
        chrono::Utc::now(),
    );
    let stale = catalogued(&runtime, stale).await;
    let mut events = runtime.events().subscribe();

    let outcome = runtime.relocator().move_file(file.clone(), &item).await.unwrap();
    let destination = item.path.join("Alien.1979.mkv");

    assert_eq!(outcome.mode, TransferMode::Move);
    assert!(!source.exists());
    assert!(destination.exists());
    assert_eq!(outcome.file.id, file.id);
    assert_eq!(outcome.file.path, destination);
    assert_eq!(outcome.file.relative_path, PathBuf::from("Alien.1979.mkv"));
    assert_eq!(outcome.superseded.len(), 1);
    assert_eq!(outcome.superseded[0].id, stale.id);

    let at_destination = runtime
        .catalog()
        .file_with_path(&destination)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_destination.id, file.id);
    assert!(runtime.catalog().get(stale.id).await.unwrap().is_none());

    let events = drain_events(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::MediaFileDeleted { file, reason: DeleteMediaFileReason::Upgrade }
            if file.id == stale.id
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::FileMoved { file: moved, old_path } if moved.id == file.id && *old_path == source
    )));
}

#[tokio::test]
async fn first_file_for_an_item_reports_the_created_item_folder() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    let file = download(&lib, &item, "Alien.1979.mkv");
    let mut events = runtime.events().subscribe();

    runtime.relocator().move_file(file, &item).await.unwrap();

    let created = drain_events(&mut events)
        .into_iter()
        .find_map(|event| match event {
            EngineEvent::FolderCreated(created) => Some(created),
            _ => None,
        })
        .expect("folder created event");
    assert_eq!(created.item_folder, Some(item.path.clone()));
    assert_eq!(created.sub_folder, None);
    assert_eq!(created.leaf_folder, None);

    // The second file finds the chain in place.
    let second = download(&lib, &item, "Alien.1979.Directors.Cut.mkv");
    runtime.relocator().move_file(second, &item).await.unwrap();
    assert!(
        !drain_events(&mut events)
            .iter()
            .any(|event| matches!(event, EngineEvent::FolderCreated(_)))
    );
}

#[tokio::test]
async fn same_filename_is_a_no_op() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    std::fs::create_dir_all(&item.path).unwrap();
    let path = item.path.join("Alien.1979.mkv");
    std::fs::write(&path, b"alien").unwrap();
    let file = catalogued(
        &runtime,
        MediaFile::new(item.id, &item.path, path.clone(), 5, chrono::Utc::now()),
    )
    .await;
    let mut events = runtime.events().subscribe();

    let err = runtime.relocator().move_file(file, &item).await.unwrap_err();

    assert!(err.is_same_filename());
    assert!(path.exists());
    assert!(drain_events(&mut events).is_empty());
    assert_eq!(runtime.trigger().ledger().ignore_count(&path), 0);
}

#[tokio::test]
async fn missing_source_fails_without_creating_folders() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    let file = MediaFile::new(
        item.id,
        &item.path,
        lib.downloads.join("gone.mkv"),
        5,
        chrono::Utc::now(),
    );

    let err = runtime.relocator().move_file(file, &item).await.unwrap_err();

    assert!(matches!(err, MediaError::SourceNotFound(path) if path == lib.downloads.join("gone.mkv")));
    assert!(!item.path.exists());
}

#[tokio::test]
async fn missing_destination_root_is_raised() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let unmounted = lib.root.parent().unwrap().join("unmounted");
    let item = LibraryItem::new(ItemKind::Movie, "Alien", unmounted.join("Alien (1979)"));
    let file = download(&lib, &item, "Alien.1979.mkv");
    let source = file.path.clone();

    let err = runtime.relocator().move_file(file, &item).await.unwrap_err();

    assert!(matches!(err, MediaError::DestinationRootMissing(root) if root == unmounted));
    assert!(source.exists());
    assert!(!unmounted.exists());
}

#[tokio::test]
async fn copy_uses_a_hardlink_and_keeps_the_source() {
    let lib = library();
    let runtime = disk_runtime(|config| config.relocation.copy_using_hardlinks = true);
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    let file = download(&lib, &item, "Alien.1979.mkv");
    let source = file.path.clone();

    let outcome = runtime.relocator().copy_file(file, &item).await.unwrap();

    assert_eq!(outcome.mode, TransferMode::HardLinkOrCopy);
    assert!(source.exists());
    assert!(outcome.file.path.exists());
    assert_eq!(
        runtime
            .catalog()
            .file_with_path(&outcome.file.path)
            .await
            .unwrap()
            .map(|row| row.id),
        Some(outcome.file.id)
    );
}

#[tokio::test]
async fn relocation_registers_its_chain_before_writing() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    let file = download(&lib, &item, "Alien.1979.mkv");
    let source = file.path.clone();

    runtime.relocator().move_file(file, &item).await.unwrap();

    let ledger = runtime.trigger().ledger();
    assert_eq!(ledger.ignore_count(&item.path), 1);
    assert_eq!(ledger.ignore_count(&source), 1);
    assert_eq!(ledger.ignore_count(&item.path.join("Alien.1979.mkv")), 1);

    // A watch notification for the new file inside the same window is dropped.
    runtime
        .trigger()
        .record_change(&item.path.join("Alien.1979.mkv"), &lib.root);
    assert!(runtime.trigger().flush().await.unwrap().is_empty());
}

/// `Artist/Album/CDn/NN.ext` layout.
struct AlbumNames;

impl FileNameBuilder for AlbumNames {
    fn build_file_name(&self, _item: &LibraryItem, file: &MediaFile) -> String {
        file.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn build_file_path(&self, item: &LibraryItem, file_name: &str, extension: &str) -> PathBuf {
        item.path
            .join("Album (2001)")
            .join("CD1")
            .join(format!("{file_name}{extension}"))
    }

    fn build_sub_folder(&self, item: &LibraryItem, _file: &MediaFile) -> Option<PathBuf> {
        Some(item.path.join("Album (2001)"))
    }
}

#[tokio::test]
async fn album_layout_creates_the_sub_folder() {
    let lib = library();
    let runtime = disk_runtime_with(
        |_| {},
        RuntimeCollaborators {
            naming: Arc::new(AlbumNames),
            ..RuntimeCollaborators::default()
        },
    );
    let item = LibraryItem::new(ItemKind::Artist, "Artist", lib.root.join("Artist"));
    std::fs::create_dir_all(&item.path).unwrap();
    let file = download(&lib, &item, "01.flac");
    let mut events = runtime.events().subscribe();

    let outcome = runtime.relocator().move_file(file, &item).await.unwrap();

    assert_eq!(outcome.file.relative_path, Path::new("Album (2001)/CD1/01.flac"));
    let created = drain_events(&mut events)
        .into_iter()
        .find_map(|event| match event {
            EngineEvent::FolderCreated(created) => Some(created),
            _ => None,
        })
        .expect("folder created event");
    assert_eq!(created.item_folder, None);
    assert_eq!(created.sub_folder, Some(item.path.join("Album (2001)")));
    assert_eq!(created.leaf_folder, Some(item.path.join("Album (2001)/CD1")));
}

#[tokio::test]
async fn rename_batch_continues_past_a_failure() {
    let lib = library();
    let runtime = disk_runtime(|_| {});
    let item = LibraryItem::new(ItemKind::Movie, "Alien", lib.root.join("Alien (1979)"));
    let nested = item.path.join("Release");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("alien.mkv"), b"alien").unwrap();

    let present = catalogued(
        &runtime,
        MediaFile::new(item.id, &item.path, nested.join("alien.mkv"), 5, chrono::Utc::now()),
    )
    .await;
    let vanished = catalogued(
        &runtime,
        MediaFile::new(item.id, &item.path, nested.join("sample.mkv"), 5, chrono::Utc::now()),
    )
    .await;

    let previews = runtime.renames().previews(&item).await.unwrap();
    assert_eq!(previews.len(), 2);
    assert_eq!(previews[0].new_path, item.path.join("alien.mkv"));

    let mut events = runtime.events().subscribe();
    let renamed = runtime.renames().rename_item(&item).await.unwrap();

    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].id, present.id);
    assert!(item.path.join("alien.mkv").exists());
    assert_eq!(
        runtime.catalog().get(vanished.id).await.unwrap().map(|row| row.path),
        Some(nested.join("sample.mkv"))
    );
    assert!(drain_events(&mut events).iter().any(
        |event| matches!(event, EngineEvent::ItemRenamed { item_id } if *item_id == item.id)
    ));
}
