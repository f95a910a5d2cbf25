//! Root-confined filesystem backend.
//!
//! Every path handed out by [`RootedFs::resolve`] is normalized and checked
//! against the canonical root before any other filesystem call is made.

pub mod error;
pub mod path;

pub use error::FsError;

use log::{debug, warn};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncSeekExt;

/// A user supplied path after normalization and root confinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Path as the client sees it, always starting with `/`.
    pub logical: String,
    /// Location on disk, below the root.
    pub physical: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EntryStat {
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub stat: Option<EntryStat>,
}

#[derive(Debug)]
pub struct RootedFs {
    root: PathBuf,
}

impl RootedFs {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = root.as_ref();
        let display = root.display().to_string();
        let canonical = std::fs::canonicalize(root).map_err(|e| FsError::from_io(e, &display))?;
        if !canonical.is_dir() {
            return Err(FsError::NotADirectory(display));
        }
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `arg` against `current_dir` and confines the result to the root.
    pub async fn resolve(&self, current_dir: &str, arg: &str) -> Result<ResolvedPath, FsError> {
        let logical = path::resolve_logical(current_dir, arg)
            .ok_or_else(|| FsError::OutsideRoot(arg.to_string()))?;
        let physical = self.root.join(logical.trim_start_matches('/'));
        self.confine(&physical, &logical).await?;
        debug!("Resolved {:?} in {:?} to {:?}", arg, current_dir, physical);
        Ok(ResolvedPath { logical, physical })
    }

    /// Canonicalizes the deepest existing ancestor of `physical` and checks it
    /// is still below the root, so symlinks cannot lead out of it.
    async fn confine(&self, physical: &Path, logical: &str) -> Result<(), FsError> {
        for ancestor in physical.ancestors() {
            match fs::canonicalize(ancestor).await {
                Ok(real) if real.starts_with(&self.root) => return Ok(()),
                Ok(real) => {
                    warn!("Path is outside of the allowed area: {:?}", real);
                    return Err(FsError::OutsideRoot(logical.to_string()));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // dangling symlink
                    if fs::symlink_metadata(ancestor).await.is_ok() {
                        warn!("Refusing dangling symlink: {:?}", ancestor);
                        return Err(FsError::OutsideRoot(logical.to_string()));
                    }
                }
                Err(e) => return Err(FsError::from_io(e, logical)),
            }
        }
        Err(FsError::OutsideRoot(logical.to_string()))
    }

    pub async fn stat(&self, path: &ResolvedPath) -> Result<EntryStat, FsError> {
        let metadata = fs::metadata(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))?;
        Ok(EntryStat {
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    /// Lists a directory, sorted by name. Entries whose metadata cannot be
    /// read are still returned, without a stat.
    pub async fn list(&self, dir: &ResolvedPath) -> Result<Vec<DirEntryInfo>, FsError> {
        let mut read_dir = fs::read_dir(&dir.physical)
            .await
            .map_err(|e| FsError::from_io(e, &dir.logical))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            let stat = match fs::metadata(entry.path()).await {
                Ok(metadata) => Some(EntryStat {
                    is_dir: metadata.is_dir(),
                    size: metadata.len(),
                    modified: metadata.modified().ok(),
                }),
                Err(e) => {
                    warn!("Failed to stat {:?}: {}", entry.path(), e);
                    None
                }
            };
            entries.push(DirEntryInfo { name, stat });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn mkdir(&self, path: &ResolvedPath) -> Result<(), FsError> {
        fs::create_dir(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))
    }

    /// Removes an empty directory.
    pub async fn rmdir(&self, path: &ResolvedPath) -> Result<(), FsError> {
        if !self.stat(path).await?.is_dir {
            return Err(FsError::NotADirectory(path.logical.clone()));
        }
        if !self.is_dir_empty(path).await? {
            return Err(FsError::NotEmpty(path.logical.clone()));
        }
        fs::remove_dir(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))
    }

    /// True when the directory holds no entry at all besides `.` and `..`.
    pub async fn is_dir_empty(&self, path: &ResolvedPath) -> Result<bool, FsError> {
        let mut read_dir = fs::read_dir(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name != "." && name != ".." {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn unlink(&self, path: &ResolvedPath) -> Result<(), FsError> {
        if self.stat(path).await?.is_dir {
            return Err(FsError::NotAFile(path.logical.clone()));
        }
        fs::remove_file(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))
    }

    pub async fn exists(&self, path: &ResolvedPath) -> bool {
        fs::symlink_metadata(&path.physical).await.is_ok()
    }

    /// Renames `from` to `to`; `to` must not exist yet.
    pub async fn rename(&self, from: &ResolvedPath, to: &ResolvedPath) -> Result<(), FsError> {
        if self.exists(to).await {
            return Err(FsError::AlreadyExists(to.logical.clone()));
        }
        fs::rename(&from.physical, &to.physical)
            .await
            .map_err(|e| FsError::from_io(e, &from.logical))
    }

    /// Opens a regular file for reading, positioned at `offset`.
    pub async fn open_read(&self, path: &ResolvedPath, offset: u64) -> Result<File, FsError> {
        if self.stat(path).await?.is_dir {
            return Err(FsError::NotAFile(path.logical.clone()));
        }
        let mut file = File::open(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(file)
    }

    /// Opens a file for writing. Offset 0 truncates; a non-zero offset keeps
    /// the first `offset` bytes and continues from there. A missing immediate
    /// parent directory is created.
    pub async fn open_write(&self, path: &ResolvedPath, offset: u64) -> Result<File, FsError> {
        if let Some(parent) = path.physical.parent() {
            if fs::metadata(parent).await.is_err() {
                debug!("Creating parent directory {:?}", parent);
                fs::create_dir(parent)
                    .await
                    .map_err(|e| FsError::from_io(e, &path.logical))?;
            }
        }
        if matches!(fs::metadata(&path.physical).await, Ok(m) if m.is_dir()) {
            return Err(FsError::NotAFile(path.logical.clone()));
        }

        if offset == 0 {
            return File::create(&path.physical)
                .await
                .map_err(|e| FsError::from_io(e, &path.logical));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path.physical)
            .await
            .map_err(|e| FsError::from_io(e, &path.logical))?;
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(file)
    }
}
