//! Rename probe: `<file>` -> `<file>.exclusiveReadLock` -> `<file>`.
//!
//! Platforms that refuse to rename a file another process has open make this a
//! cheap "is anyone writing?" test. Renaming back is mandatory; if it fails the
//! file is stranded under the probe name and the error is fatal.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use tracing::trace;

use super::{LockContext, LockOutcome, Probe, retry_io, settle};
use crate::errors::ClaimError;
use crate::file_ref::FileRef;
use crate::retry::{Poll, RetryBudget, poll_until};

pub const DEFAULT_PROBE_SUFFIX: &str = ".exclusiveReadLock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameProbeLock {
    budget: RetryBudget,
    suffix: String,
}

impl Default for RenameProbeLock {
    fn default() -> Self {
        Self::new(RetryBudget::default())
    }
}

impl RenameProbeLock {
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            budget,
            suffix: DEFAULT_PROBE_SUFFIX.to_string(),
        }
    }

    pub fn probe_path_for(&self, file: &FileRef) -> PathBuf {
        let mut name: OsString = file.absolute_path().as_os_str().to_owned();
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    pub(super) fn acquire(
        &self,
        file: &FileRef,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        let path = file.absolute_path();
        let probe = self.probe_path_for(file);

        let outcome = poll_until(&self.budget, ctx.cancel, |attempt| {
            match ctx.ops.rename_file(path, &probe) {
                Ok(()) => {
                    ctx.ops
                        .rename_file(&probe, path)
                        .map_err(|e| {
                            ClaimError::io("rename probe back to original name", &probe, e)
                        })?;
                    trace!(file = %file, attempt, "Rename probe succeeded");
                    Ok(Poll::Ready(Probe::Acquired))
                }
                // Another consumer is mid-probe on the same file.
                Err(e) if e.kind() == io::ErrorKind::NotFound && ctx.ops.exists(&probe) => {
                    trace!(file = %file, attempt, "File is under another probe");
                    Ok(Poll::Pending)
                }
                Err(e) => retry_io(&self.budget, ctx.os, "rename probe", path, e),
            }
        })?;
        Ok(settle(outcome))
    }
}
