//! Exclusive read-lock strategies.
//!
//! A [`ReadLock`] decides whether this consumer may process a file right now.
//! Leaf strategies:
//! - `MarkerFile`: atomic creation of `<file><suffix>`; cooperating consumers only.
//! - `OsFileLock`: exclusive OS byte-range lock, taken and dropped as a probe.
//! - `RenameProbe`: rename away and back; fails while a writer holds the file.
//!
//! Decorators wrap another strategy:
//! - `ChangeDetection`: wait until size/mtime stop changing, then delegate.
//! - `Idempotent`: claim a key in a shared repository, then delegate.
//! - `Composite`: acquire several in order, all-or-nothing.
//!
//! Not acquiring a lock is an ordinary outcome ([`LockOutcome::NotAcquired`]); only
//! failures the retry policy cannot absorb are returned as errors.

mod changed;
mod idempotent;
mod marker;
mod os_lock;
mod rename_probe;
pub mod sweep;

use std::fmt;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::ClaimError;
use crate::file_ref::FileRef;
use crate::ops::FileOperations;
use crate::platform::{IoErrorClass, TargetOs, classify_io_error};
use crate::retry::{Poll, RetryBudget, WaitOutcome};
use crate::shutdown::CancelToken;

pub use changed::{ChangeDetectionLock, DEFAULT_MIN_LENGTH};
pub use idempotent::{IdempotentHandle, IdempotentLock};
pub use marker::{DEFAULT_MARKER_SUFFIX, MarkerFileLock, MarkerHandle};
pub use os_lock::OsFileLock;
pub use rename_probe::{DEFAULT_PROBE_SUFFIX, RenameProbeLock};
pub use sweep::{OrphanLockSweeper, SweepReport};

/// Why a file was not claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TimedOut,
    Cancelled,
    /// Another consumer holds the marker or the idempotent key.
    Held,
    Vanished,
    TooYoung,
    TooSmall,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::TimedOut => "timed out",
            SkipReason::Cancelled => "cancelled",
            SkipReason::Held => "held by another consumer",
            SkipReason::Vanished => "file vanished",
            SkipReason::TooYoung => "younger than minimum age",
            SkipReason::TooSmall => "smaller than minimum length",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum LockOutcome {
    Acquired(LockHandle),
    NotAcquired(SkipReason),
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }
}

/// What a successful acquisition leaves behind to be released later.
///
/// Releasing consumes the recorded state, so a second release is a no-op.
#[derive(Debug)]
pub enum LockHandle {
    /// Probe-only strategies keep nothing.
    Probe,
    Marker(MarkerHandle),
    Idempotent(IdempotentHandle),
    Composite(Vec<LockHandle>),
}

/// Which transaction path is releasing the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePhase {
    Commit,
    Rollback,
    Abort,
}

/// Collaborators a strategy needs while acquiring.
#[derive(Debug, Clone, Copy)]
pub struct LockContext<'a> {
    pub ops: &'a dyn FileOperations,
    pub cancel: &'a CancelToken,
    pub os: TargetOs,
}

#[derive(Debug, Clone)]
pub enum ReadLock {
    None,
    MarkerFile(MarkerFileLock),
    OsFileLock(OsFileLock),
    RenameProbe(RenameProbeLock),
    ChangeDetection(ChangeDetectionLock),
    Idempotent(IdempotentLock),
    Composite(Vec<ReadLock>),
}

impl ReadLock {
    pub fn name(&self) -> &'static str {
        match self {
            ReadLock::None => "none",
            ReadLock::MarkerFile(_) => "markerFile",
            ReadLock::OsFileLock(_) => "fileLock",
            ReadLock::RenameProbe(_) => "rename",
            ReadLock::ChangeDetection(_) => "changed",
            ReadLock::Idempotent(_) => "idempotent",
            ReadLock::Composite(_) => "composite",
        }
    }

    pub fn acquire(
        &self,
        file: &FileRef,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        match self {
            ReadLock::None => Ok(LockOutcome::Acquired(LockHandle::Probe)),
            ReadLock::MarkerFile(lock) => lock.acquire(file, ctx),
            ReadLock::OsFileLock(lock) => lock.acquire(file, ctx),
            ReadLock::RenameProbe(lock) => lock.acquire(file, ctx),
            ReadLock::ChangeDetection(lock) => lock.acquire(file, ctx),
            ReadLock::Idempotent(lock) => lock.acquire(file, ctx),
            ReadLock::Composite(chain) => acquire_chain(chain, file, ctx),
        }
    }

    /// Release whatever `handle` still holds. Safe to call more than once.
    pub fn release(
        &self,
        handle: &mut LockHandle,
        phase: ReleasePhase,
        ops: &dyn FileOperations,
    ) -> Result<(), ClaimError> {
        match (self, handle) {
            (ReadLock::MarkerFile(lock), LockHandle::Marker(h)) => lock.release(h, ops),
            (ReadLock::ChangeDetection(lock), handle) => lock.inner().release(handle, phase, ops),
            (ReadLock::Idempotent(lock), LockHandle::Idempotent(h)) => lock.release(h, phase, ops),
            (ReadLock::Composite(chain), LockHandle::Composite(handles)) => {
                release_chain(chain, handles, phase, ops)
            }
            (_, LockHandle::Probe) => Ok(()),
            (lock, handle) => {
                warn!(
                    strategy = lock.name(),
                    handle = ?handle,
                    "Lock handle does not belong to this strategy; nothing released"
                );
                Ok(())
            }
        }
    }

    /// The marker strategy in this chain, if any.
    pub fn marker(&self) -> Option<&MarkerFileLock> {
        match self {
            ReadLock::MarkerFile(m) => Some(m),
            ReadLock::ChangeDetection(c) => c.inner().marker(),
            ReadLock::Idempotent(i) => i.inner().marker(),
            ReadLock::Composite(chain) => chain.iter().find_map(ReadLock::marker),
            _ => None,
        }
    }
}

fn acquire_chain(
    chain: &[ReadLock],
    file: &FileRef,
    ctx: &LockContext<'_>,
) -> Result<LockOutcome, ClaimError> {
    let mut held: Vec<LockHandle> = Vec::with_capacity(chain.len());
    for lock in chain {
        let outcome = lock.acquire(file, ctx);
        match outcome {
            Ok(LockOutcome::Acquired(handle)) => held.push(handle),
            other => {
                let mut handles = held;
                let acquired = &chain[..handles.len()];
                let released = release_chain(acquired, &mut handles, ReleasePhase::Abort, ctx.ops);
                if let Err(e) = released {
                    warn!(file = %file, error = %e, "Failed to release partially acquired locks");
                }
                return other;
            }
        }
    }
    Ok(LockOutcome::Acquired(LockHandle::Composite(held)))
}

/// Release in reverse acquisition order; every member is attempted, the first error wins.
fn release_chain(
    chain: &[ReadLock],
    handles: &mut [LockHandle],
    phase: ReleasePhase,
    ops: &dyn FileOperations,
) -> Result<(), ClaimError> {
    let mut first_err = None;
    for (lock, handle) in chain.iter().zip(handles.iter_mut()).rev() {
        if let Err(e) = lock.release(handle, phase, ops) {
            debug!(strategy = lock.name(), error = %e, "Release failed");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Result of one probe attempt inside a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Acquired,
    Vanished,
}

/// Map an I/O error seen while probing onto the retry policy.
///
/// Vanished files end the wait. Transient errors are retried only under a bounded
/// budget; with an unbounded budget, and for permanent errors, they are fatal.
pub(crate) fn retry_io(
    budget: &RetryBudget,
    os: TargetOs,
    op: &'static str,
    path: &Path,
    err: io::Error,
) -> Result<Poll<Probe>, ClaimError> {
    match classify_io_error(&err, os) {
        IoErrorClass::Vanished => Ok(Poll::Ready(Probe::Vanished)),
        IoErrorClass::Transient if budget.is_bounded() => {
            debug!(
                path = %path.display(),
                error = %err,
                "Cannot acquire read lock; will try again"
            );
            Ok(Poll::Pending)
        }
        _ => Err(ClaimError::io(op, path, err)),
    }
}

/// Turn the end of a probe loop into a lock outcome.
pub(crate) fn settle(outcome: WaitOutcome<Probe>) -> LockOutcome {
    match outcome {
        WaitOutcome::Ready(Probe::Acquired) => LockOutcome::Acquired(LockHandle::Probe),
        WaitOutcome::Ready(Probe::Vanished) => LockOutcome::NotAcquired(SkipReason::Vanished),
        WaitOutcome::TimedOut => LockOutcome::NotAcquired(SkipReason::TimedOut),
        WaitOutcome::Cancelled => LockOutcome::NotAcquired(SkipReason::Cancelled),
    }
}
