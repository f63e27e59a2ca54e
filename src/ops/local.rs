//! Local filesystem implementation of [`FileOperations`].

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use filetime::{FileTime, set_file_mtime};
use tracing::{debug, trace};

use super::{FileOperations, FileStat, is_cross_device};

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileOperations;

impl LocalFileOperations {
    pub fn new() -> Self {
        LocalFileOperations
    }
}

impl FileOperations for LocalFileOperations {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path)?;
        Ok(FileStat {
            len: meta.len(),
            modified: meta.modified()?,
        })
    }

    fn create_new(&self, path: &Path) -> io::Result<()> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                debug!(
                    src = %from.display(),
                    dest = %to.display(),
                    "Cross-device rename; falling back to copy and delete"
                );
                copy_then_remove(from, to)
            }
            Err(e) => Err(e),
        }
    }

    fn build_directory(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }
}

/// Copy contents and mtime, then remove the source. A failed removal rolls back the copy.
fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::metadata(from)?;
    fs::copy(from, to)?;
    let mtime = FileTime::from_last_modification_time(&meta);
    if let Err(e) = set_file_mtime(to, mtime) {
        trace!(dest = %to.display(), error = %e, "Could not preserve mtime after copy");
    }
    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}
