//! Marker-file lock: exclusive creation of `<file><suffix>` next to the file.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use tracing::trace;

use super::{LockContext, LockHandle, LockOutcome, SkipReason};
use crate::errors::ClaimError;
use crate::file_ref::FileRef;
use crate::ops::FileOperations;

pub const DEFAULT_MARKER_SUFFIX: &str = ".lock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFileLock {
    suffix: String,
    delete_orphans_on_startup: bool,
}

impl Default for MarkerFileLock {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_MARKER_SUFFIX.to_string(),
            delete_orphans_on_startup: true,
        }
    }
}

/// Marker this consumer created; `None` once released.
#[derive(Debug, Default)]
pub struct MarkerHandle {
    lock_path: Option<PathBuf>,
}

impl MarkerHandle {
    pub fn lock_path(&self) -> Option<&std::path::Path> {
        self.lock_path.as_deref()
    }
}

impl MarkerFileLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_delete_orphans(mut self, enabled: bool) -> Self {
        self.delete_orphans_on_startup = enabled;
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn deletes_orphans_on_startup(&self) -> bool {
        self.delete_orphans_on_startup
    }

    pub fn lock_path_for(&self, file: &FileRef) -> PathBuf {
        let mut name: OsString = file.lock_key_path().as_os_str().to_owned();
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    pub(super) fn acquire(
        &self,
        file: &FileRef,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        let lock_path = self.lock_path_for(file);
        match ctx.ops.create_new(&lock_path) {
            Ok(()) => {
                trace!(lock = %lock_path.display(), "Created marker file");
                Ok(LockOutcome::Acquired(LockHandle::Marker(MarkerHandle {
                    lock_path: Some(lock_path),
                })))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                trace!(lock = %lock_path.display(), "Marker file already exists");
                Ok(LockOutcome::NotAcquired(SkipReason::Held))
            }
            // The directory itself is gone.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(LockOutcome::NotAcquired(SkipReason::Vanished))
            }
            Err(e) => Err(ClaimError::io("create marker file", lock_path, e)),
        }
    }

    pub(super) fn release(
        &self,
        handle: &mut MarkerHandle,
        ops: &dyn FileOperations,
    ) -> Result<(), ClaimError> {
        let Some(lock_path) = handle.lock_path.take() else {
            return Ok(());
        };
        match ops.delete_file(&lock_path) {
            Ok(()) => {
                trace!(lock = %lock_path.display(), "Deleted marker file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClaimError::io("delete marker file", lock_path, e)),
        }
    }
}
