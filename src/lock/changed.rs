//! Change detection: wait until a file has stopped growing, then delegate.

use std::time::{Duration, SystemTime};

use tracing::trace;

use super::{LockContext, LockOutcome, Probe, ReadLock, SkipReason, retry_io};
use crate::errors::ClaimError;
use crate::file_ref::FileRef;
use crate::ops::FileStat;
use crate::retry::{Poll, RetryBudget, WaitOutcome, poll_until};

/// Smallest size a stable file must reach; an empty file may still be opening.
pub const DEFAULT_MIN_LENGTH: u64 = 1;

/// A file is stable once two consecutive samples agree on size and mtime and the
/// size is at least `min_length` (default [`DEFAULT_MIN_LENGTH`]). With a non-zero
/// `min_age`, a file whose mtime is already that old counts as stable on the first
/// sample.
#[derive(Debug, Clone)]
pub struct ChangeDetectionLock {
    budget: RetryBudget,
    min_length: u64,
    min_age: Duration,
    inner: Box<ReadLock>,
}

impl ChangeDetectionLock {
    pub fn new(budget: RetryBudget, inner: ReadLock) -> Self {
        Self {
            budget,
            min_length: DEFAULT_MIN_LENGTH,
            min_age: Duration::ZERO,
            inner: Box::new(inner),
        }
    }

    pub fn with_min_length(mut self, min_length: u64) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn with_min_age(mut self, min_age: Duration) -> Self {
        self.min_age = min_age;
        self
    }

    pub fn min_length(&self) -> u64 {
        self.min_length
    }

    pub fn inner(&self) -> &ReadLock {
        &self.inner
    }

    fn is_stable(&self, previous: Option<FileStat>, current: FileStat) -> bool {
        if current.len < self.min_length {
            return false;
        }
        if self.min_age.is_zero() {
            return previous == Some(current);
        }
        SystemTime::now()
            .duration_since(current.modified)
            .is_ok_and(|age| age >= self.min_age)
    }

    pub(super) fn acquire(
        &self,
        file: &FileRef,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        let path = file.absolute_path();
        let mut previous: Option<FileStat> = None;

        let outcome = poll_until(&self.budget, ctx.cancel, |attempt| {
            let current = match ctx.ops.stat(path) {
                Ok(stat) => stat,
                Err(e) => {
                    return retry_io(&self.budget, ctx.os, "stat for change detection", path, e);
                }
            };
            trace!(
                file = %file,
                attempt,
                previous_len = previous.map(|s| s.len),
                len = current.len,
                "Sampled file for changes"
            );
            if self.is_stable(previous, current) {
                Ok(Poll::Ready(Probe::Acquired))
            } else {
                previous = Some(current);
                Ok(Poll::Pending)
            }
        })?;

        match outcome {
            WaitOutcome::Ready(Probe::Acquired) => self.inner.acquire(file, ctx),
            WaitOutcome::Ready(Probe::Vanished) => {
                Ok(LockOutcome::NotAcquired(SkipReason::Vanished))
            }
            WaitOutcome::TimedOut => Ok(LockOutcome::NotAcquired(SkipReason::TimedOut)),
            WaitOutcome::Cancelled => Ok(LockOutcome::NotAcquired(SkipReason::Cancelled)),
        }
    }
}
