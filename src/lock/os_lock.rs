//! OS file-lock probe.
//!
//! Takes an exclusive advisory lock (flock/LockFileEx via fs2) and drops it
//! immediately: success only proves no other process held a conflicting lock at
//! that instant. The OS lock is never held while the file is processed.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;
use tracing::trace;

use super::{LockContext, LockHandle, LockOutcome, Probe, SkipReason, retry_io, settle};
use crate::errors::ClaimError;
use crate::file_ref::FileRef;
use crate::platform::{IoErrorClass, classify_io_error};
use crate::retry::{Poll, RetryBudget, poll_until};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsFileLock {
    budget: RetryBudget,
}

impl OsFileLock {
    pub fn new(budget: RetryBudget) -> Self {
        Self { budget }
    }

    pub(super) fn acquire(
        &self,
        file: &FileRef,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        let path = file.absolute_path();
        trace!(file = %file, bounded = self.budget.is_bounded(), "Waiting for exclusive OS lock");

        if !self.budget.is_bounded() {
            return self.acquire_blocking(path, ctx);
        }

        let outcome = poll_until(&self.budget, ctx.cancel, |attempt| {
            let handle = match open_for_lock(path) {
                Ok(f) => f,
                Err(e) => return retry_io(&self.budget, ctx.os, "open for lock probe", path, e),
            };
            match FileExt::try_lock_exclusive(&handle) {
                Ok(()) => {
                    let _ = FileExt::unlock(&handle);
                    Ok(Poll::Ready(Probe::Acquired))
                }
                Err(e) if is_contended(&e) => {
                    trace!(file = %file, attempt, "OS lock held elsewhere");
                    Ok(Poll::Pending)
                }
                Err(e) => retry_io(&self.budget, ctx.os, "lock file", path, e),
            }
        })?;
        Ok(settle(outcome))
    }

    /// Unbounded budget: block in the OS until the lock is granted.
    /// Cancellation is only observed before the call.
    fn acquire_blocking(
        &self,
        path: &Path,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        if ctx.cancel.is_cancelled() {
            return Ok(LockOutcome::NotAcquired(SkipReason::Cancelled));
        }
        let handle = match open_for_lock(path) {
            Ok(f) => f,
            Err(e) if classify_io_error(&e, ctx.os) == IoErrorClass::Vanished => {
                return Ok(LockOutcome::NotAcquired(SkipReason::Vanished));
            }
            Err(e) => return Err(ClaimError::io("open for lock probe", path, e)),
        };
        FileExt::lock_exclusive(&handle).map_err(|e| ClaimError::io("lock file", path, e))?;
        let _ = FileExt::unlock(&handle);
        Ok(LockOutcome::Acquired(LockHandle::Probe))
    }
}

fn open_for_lock(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
