//! Filesystem access used by the handlers: stat, list, open, move, remove.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};

use crate::range::RangeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// A path under the served root, classified on each request.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: PathBuf,
    pub kind: NodeKind,
    /// Zero for directories
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn media_type(&self) -> Option<String> {
        match self.kind {
            NodeKind::Directory => None,
            NodeKind::File => media_type(&self.path),
        }
    }
}

/// Media type derived from the file extension, `None` when unknown.
pub fn media_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Classify `path`, following symlinks. `Ok(None)` when nothing is there.
pub async fn stat(path: &Path) -> std::io::Result<Option<Node>> {
    match fs::metadata(path).await {
        Ok(metadata) => {
            let (kind, size) = if metadata.is_dir() {
                (NodeKind::Directory, 0)
            } else {
                (NodeKind::File, metadata.len())
            };
            Ok(Some(Node {
                path: path.to_path_buf(),
                kind,
                size,
                modified: metadata.modified().ok(),
            }))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub name: String,
    pub is_dir: bool,
    /// `None` for directories and broken symlinks
    pub size: Option<u64>,
}

/// Immediate children of `dir`, sorted by name.
pub async fn list_dir(dir: &Path) -> std::io::Result<Vec<Child>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut children = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let (is_dir, size) = match fs::metadata(entry.path()).await {
            Ok(metadata) if metadata.is_dir() => (true, None),
            Ok(metadata) => (false, Some(metadata.len())),
            // broken symlink
            Err(_) => (false, None),
        };
        children.push(Child { name, is_dir, size });
    }

    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(children)
}

/// Open `path` positioned at the window start, limited to its length.
pub async fn open_window(path: &Path, window: &RangeWindow) -> std::io::Result<Take<File>> {
    let mut file = File::open(path).await?;
    if window.start > 0 {
        file.seek(SeekFrom::Start(window.start)).await?;
    }
    Ok(file.take(window.length))
}

/// Move a fully received upload from its staging path to `dest`.
///
/// Falls back to copying when the two paths are on different filesystems.
pub async fn move_into_place(staged: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::rename(staged, dest).await.is_ok() {
        return Ok(());
    }
    fs::copy(staged, dest).await?;
    fs::remove_file(staged).await
}

pub async fn remove_file(path: &Path) -> std::io::Result<()> {
    fs::remove_file(path).await
}
