use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;
use tracing::debug;

/// Minimal, async-capable filesystem abstraction used by the scanner and the
/// relocator.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Check whether a path exists.
    async fn path_exists(&self, path: &Path) -> bool;

    /// Open a directory for iteration.
    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>>;

    /// Fetch lightweight file metadata.
    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;

    /// Create a single directory. The parent must already exist.
    async fn create_folder(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory, optionally with everything below it.
    async fn delete_folder(&self, path: &Path, recursive: bool) -> io::Result<()>;

    /// Apply unix permission bits. A no-op where the platform has none.
    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Overwrite the last-write time of a file or directory.
    async fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()>;

    /// Check whether a path exists and is a directory.
    async fn folder_exists(&self, path: &Path) -> bool {
        self.metadata(path).await.map(|md| md.is_dir).unwrap_or(false)
    }

    /// Check whether a path exists and is a regular file.
    async fn file_exists(&self, path: &Path) -> bool {
        self.metadata(path).await.map(|md| md.is_file).unwrap_or(false)
    }
}

/// Lightweight metadata needed by scanners.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    /// The path itself is a symbolic link; the other fields describe its
    /// target.
    pub is_symlink: bool,
    pub len: u64,
    /// Last modified time if available
    pub modified: Option<SystemTime>,
}

/// Async directory iterator (similar to tokio::fs::ReadDir).
#[async_trait]
pub trait ReadDirStream {
    /// Return next entry's path, or None when exhausted.
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>>;
}

/// A file found on disk while listing an item folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for RealFs {
    async fn path_exists(&self, path: &Path) -> bool {
        // try_exists avoids errors for permission issues by returning false
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let rd = tokio::fs::read_dir(path).await?;
        Ok(Box::new(RealReadDir { inner: rd }))
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let link = tokio::fs::symlink_metadata(path).await?;
        let is_symlink = link.file_type().is_symlink();
        let md = if is_symlink {
            tokio::fs::metadata(path).await?
        } else {
            link
        };
        Ok(FsMetadata {
            is_dir: md.is_dir(),
            is_file: md.is_file(),
            is_symlink,
            len: md.len(),
            modified: md.modified().ok(),
        })
    }

    async fn create_folder(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    async fn delete_folder(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if recursive {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_dir(path).await
        }
    }

    #[cfg(unix)]
    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }

    #[cfg(not(unix))]
    async fn set_permissions(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    async fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || std::fs::File::open(&path)?.set_modified(time))
            .await
            .map_err(io::Error::other)?
    }
}

struct RealReadDir {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl ReadDirStream for RealReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>> {
        Ok(self.inner.next_entry().await?.map(|entry| entry.path()))
    }
}

/// In-memory filesystem for tests.
/// Note: Paths are treated literally; callers should use consistent absolute paths.
#[derive(Default)]
pub struct InMemoryFs {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
    read_dir_calls: AtomicUsize,
}

#[derive(Clone, Debug)]
enum Node {
    Dir { modified: Option<SystemTime>, mode: Option<u32> },
    File { len: u64, modified: Option<SystemTime>, mode: Option<u32> },
}

impl fmt::Debug for InMemoryFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryFs")
            .field("nodes", &self.nodes.read().len())
            .field("read_dir_calls", &self.read_dir_calls())
            .finish()
    }
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory and any missing parents.
    pub fn add_dir<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &path);
        nodes.entry(path).or_insert(Node::Dir {
            modified: None,
            mode: None,
        });
    }

    /// Add a file and any missing parents.
    pub fn add_file<P: Into<PathBuf>>(&self, path: P, len: u64, modified: SystemTime) {
        let path = path.into();
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File {
                len,
                modified: Some(modified),
                mode: None,
            },
        );
    }

    /// Remove a path and everything below it.
    pub fn remove(&self, path: &Path) {
        self.nodes
            .write()
            .retain(|candidate, _| !candidate.starts_with(path));
    }

    /// Number of directory listings served so far.
    pub fn read_dir_calls(&self) -> usize {
        self.read_dir_calls.load(Ordering::SeqCst)
    }

    /// Permission bits last applied to `path`.
    pub fn mode_of(&self, path: &Path) -> Option<u32> {
        match self.nodes.read().get(path)? {
            Node::Dir { mode, .. } | Node::File { mode, .. } => *mode,
        }
    }

    fn ensure_parents(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir {
                modified: None,
                mode: None,
            });
        }
    }

    fn children(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> VecDeque<PathBuf> {
        nodes
            .keys()
            .filter(|candidate| candidate.parent() == Some(path))
            .cloned()
            .collect()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such path: {}", path.display()),
    )
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn path_exists(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(path)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>> {
        self.read_dir_calls.fetch_add(1, Ordering::SeqCst);
        let nodes = self.nodes.read();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(Box::new(InMemReadDir {
                queue: Self::children(&nodes, path),
            })),
            Some(Node::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("read_dir on file: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        match self.nodes.read().get(path) {
            Some(Node::Dir { modified, .. }) => Ok(FsMetadata {
                is_dir: true,
                is_file: false,
                is_symlink: false,
                len: 0,
                modified: *modified,
            }),
            Some(Node::File { len, modified, .. }) => Ok(FsMetadata {
                is_dir: false,
                is_file: true,
                is_symlink: false,
                len: *len,
                modified: *modified,
            }),
            None => Err(not_found(path)),
        }
    }

    async fn create_folder(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already exists: {}", path.display()),
            ));
        }
        match path.parent().and_then(|parent| nodes.get(parent)) {
            Some(Node::Dir { .. }) => {
                nodes.insert(
                    path.to_path_buf(),
                    Node::Dir {
                        modified: Some(SystemTime::now()),
                        mode: None,
                    },
                );
                Ok(())
            }
            _ => Err(not_found(path.parent().unwrap_or(path))),
        }
    }

    async fn delete_folder(&self, path: &Path, recursive: bool) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", path.display()),
                ));
            }
            None => return Err(not_found(path)),
        }
        if !recursive && !Self::children(&nodes, path).is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("directory not empty: {}", path.display()),
            ));
        }
        nodes.retain(|candidate, _| !candidate.starts_with(path));
        Ok(())
    }

    async fn set_permissions(&self, path: &Path, new_mode: u32) -> io::Result<()> {
        match self.nodes.write().get_mut(path) {
            Some(Node::Dir { mode, .. }) | Some(Node::File { mode, .. }) => {
                *mode = Some(new_mode);
                Ok(())
            }
            None => Err(not_found(path)),
        }
    }

    async fn set_modified(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        match self.nodes.write().get_mut(path) {
            Some(Node::Dir { modified, .. }) | Some(Node::File { modified, .. }) => {
                *modified = Some(time);
                Ok(())
            }
            None => Err(not_found(path)),
        }
    }
}

struct InMemReadDir {
    queue: VecDeque<PathBuf>,
}

#[async_trait]
impl ReadDirStream for InMemReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>> {
        Ok(self.queue.pop_front())
    }
}

/// Direct sub-directories of `path`.
pub async fn list_directories(fs: &dyn FileSystem, path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut stream = fs.read_dir(path).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = stream.next_entry().await? {
        if fs.folder_exists(&entry).await {
            dirs.push(entry);
        }
    }
    Ok(dirs)
}

/// Every regular file below `path`, depth first. Entries that vanish while
/// walking are skipped. Symlinked files are listed; symlinked directories
/// are not entered.
pub async fn list_files_recursive(fs: &dyn FileSystem, path: &Path) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut stream = fs.read_dir(&dir).await?;
        while let Some(entry) = stream.next_entry().await? {
            let Ok(md) = fs.metadata(&entry).await else {
                continue;
            };
            if md.is_dir && md.is_symlink {
                debug!("Not following directory link {}", entry.display());
            } else if md.is_dir {
                pending.push(entry);
            } else if md.is_file {
                files.push(LocalFile {
                    path: entry,
                    size: md.len,
                    modified: md
                        .modified
                        .map(DateTime::<Utc>::from)
                        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Remove every sub-directory of `path` that holds no files at any depth.
/// `path` itself is kept. Returns the removed directories, deepest first.
pub async fn remove_empty_subfolders(fs: &dyn FileSystem, path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for child in list_directories(fs, &dir).await? {
            if fs.metadata(&child).await.is_ok_and(|md| md.is_symlink) {
                continue;
            }
            pending.push(child.clone());
            dirs.push(child);
        }
    }
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    let mut removed = Vec::new();
    for dir in dirs {
        if !fs.folder_exists(&dir).await {
            continue;
        }
        if list_files_recursive(fs, &dir).await?.is_empty() {
            fs.delete_folder(&dir, true).await?;
            removed.push(dir);
        }
    }
    Ok(removed)
}

/// Create `path` and any missing ancestors. Returns the folders actually
/// created, outermost first.
pub async fn create_folder_all(fs: &dyn FileSystem, path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() || fs.folder_exists(ancestor).await {
            break;
        }
        missing.push(ancestor.to_path_buf());
    }
    missing.reverse();

    for folder in &missing {
        match fs.create_folder(folder).await {
            Ok(()) => {}
            // Someone else created it in the meantime.
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
    Ok(missing)
}

/// Lexically normalise a path: fold `.` and `..` segments and drop trailing
/// separators. Never touches the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether `path` sits strictly below `ancestor`, compared per component.
pub fn is_nested_under(path: &Path, ancestor: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}
