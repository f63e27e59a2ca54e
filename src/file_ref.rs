//! Identity of a candidate file within a consumer root.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::ops::FileStat;

/// A discovered file: its absolute path, its path relative to the consumer root, and
/// the size/mtime observed when it was listed.
///
/// A renamed reference keeps the path it was first discovered at in `copied_from`.
/// That original path is the lock key, so marker files and idempotent keys stay
/// put when the file itself moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    root: PathBuf,
    absolute: PathBuf,
    relative: PathBuf,
    len: u64,
    modified: SystemTime,
    copied_from: Option<PathBuf>,
}

impl FileRef {
    pub fn new(root: impl Into<PathBuf>, absolute: impl Into<PathBuf>, stat: FileStat) -> Self {
        let root = root.into();
        let absolute = absolute.into();
        let relative = relative_to(&root, &absolute);
        Self {
            root,
            absolute,
            relative,
            len: stat.len,
            modified: stat.modified,
            copied_from: None,
        }
    }

    /// Stat `path` (absolute, or relative to `root`) and build a reference for it.
    ///
    /// The root and the file's parent directory are canonicalised; the file name
    /// itself is kept so a symlinked file is claimed under its own name.
    pub fn from_path(root: &Path, path: &Path) -> io::Result<Self> {
        let root = dunce::canonicalize(root)?;
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let name = joined.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path has no file name: {}", joined.display()),
            )
        })?;
        let absolute = match joined.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                dunce::canonicalize(parent)?.join(name)
            }
            _ => joined.clone(),
        };
        let meta = std::fs::metadata(&absolute)?;
        let stat = FileStat {
            len: meta.len(),
            modified: meta.modified()?,
        };
        Ok(Self::new(root, absolute, stat))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative
    }

    /// Path used to derive marker file names and idempotent keys.
    pub fn lock_key_path(&self) -> &Path {
        self.copied_from.as_deref().unwrap_or(&self.absolute)
    }

    pub fn parent(&self) -> &Path {
        self.absolute.parent().unwrap_or(&self.root)
    }

    /// File name without directories.
    pub fn only_name(&self) -> String {
        self.absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn copied_from(&self) -> Option<&Path> {
        self.copied_from.as_deref()
    }

    /// The same file after a rename to `absolute`.
    pub fn relocated(&self, absolute: impl Into<PathBuf>) -> Self {
        let absolute = absolute.into();
        Self {
            root: self.root.clone(),
            relative: relative_to(&self.root, &absolute),
            absolute,
            len: self.len,
            modified: self.modified,
            copied_from: Some(
                self.copied_from
                    .clone()
                    .unwrap_or_else(|| self.absolute.clone()),
            ),
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.absolute.display())
    }
}

fn relative_to(root: &Path, absolute: &Path) -> PathBuf {
    match absolute.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => absolute
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| absolute.to_path_buf()),
    }
}
