//! Windows file helpers. No ACL management; files inherit the directory's ACL.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub(super) fn create_private(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Directories cannot be opened for fsync through std on Windows.
pub(super) fn sync_dir(_dir: &Path) {}
