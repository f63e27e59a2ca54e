//! Filesystem operations used by lock strategies and commit/rollback actions.
//!
//! Everything that touches the consumed file (stat, rename, delete, marker creation)
//! goes through [`FileOperations`], so the retry and stability logic can be driven
//! by a scripted implementation in tests.

mod helpers;
mod local;

use std::fmt;
use std::io;
use std::path::Path;
use std::time::SystemTime;

pub use helpers::describe_io;
pub(crate) use helpers::is_cross_device;
pub use local::LocalFileOperations;

/// Size and modification time, as sampled by change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    pub modified: SystemTime,
}

pub trait FileOperations: Send + Sync + fmt::Debug {
    fn exists(&self, path: &Path) -> bool;

    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Create an empty file, failing with `AlreadyExists` if anything is at `path`.
    fn create_new(&self, path: &Path) -> io::Result<()>;

    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Rename `from` to `to`, replacing `to` if the platform allows it.
    fn rename_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create `dir` and all missing parents.
    fn build_directory(&self, dir: &Path) -> io::Result<()>;
}
