//! Per-file orchestration: thresholds, lock, pre-move, then commit / rollback / abort.
//!
//! ```text
//! Idle -> LockPending -> Locked -> Committing  -> Done
//!              |                -> RollingBack -> Done
//!              +-> Aborted (skipped: timed out, held, vanished, ...)
//! ```
//!
//! The lock is always released before the commit or failure action runs, so a
//! failing move or delete never leaves the file claimed.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, trace, warn};

use crate::config::SkipLogLevel;
use crate::errors::ClaimError;
use crate::file_ref::FileRef;
use crate::filter::{PathFilter, ScanScope};
use crate::lock::{
    LockContext, LockHandle, LockOutcome, OrphanLockSweeper, ReadLock, ReleasePhase, SkipReason,
    SweepReport,
};
use crate::ops::{FileOperations, LocalFileOperations};
use crate::platform::TargetOs;
use crate::renamer::Renamer;
use crate::shutdown::CancelToken;

pub const DEFAULT_DELETE_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELETE_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_DONE_DIR: &str = ".done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitAction {
    Leave,
    Delete,
    Move(Renamer),
}

/// Move into a `.done` directory next to the file; dot-directories are never scanned.
impl Default for CommitAction {
    fn default() -> Self {
        CommitAction::Move(Renamer::affix(Some(format!("{DEFAULT_DONE_DIR}/")), None))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    LockPending,
    Locked,
    Committing,
    RollingBack,
    Done,
    Aborted,
}

/// Files younger or smaller than this are skipped before any lock attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub min_age: Duration,
    pub min_length: u64,
}

impl Thresholds {
    pub fn check(&self, file: &FileRef) -> Option<SkipReason> {
        if file.len() < self.min_length {
            return Some(SkipReason::TooSmall);
        }
        if !self.min_age.is_zero() {
            let age = SystemTime::now()
                .duration_since(file.modified())
                .unwrap_or(Duration::ZERO);
            if age < self.min_age {
                return Some(SkipReason::TooYoung);
            }
        }
        None
    }
}

/// Where the file ended up once a transaction finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Left(FileRef),
    Moved(FileRef),
    Deleted,
}

#[derive(Debug)]
pub enum Begin<'a> {
    Locked(Transaction<'a>),
    Skipped(SkipReason),
}

impl Begin<'_> {
    pub fn is_locked(&self) -> bool {
        matches!(self, Begin::Locked(_))
    }
}

#[derive(Debug)]
pub struct ProcessStrategy {
    lock: ReadLock,
    ops: Arc<dyn FileOperations>,
    pre_move: Option<Renamer>,
    on_commit: CommitAction,
    on_failure: Option<Renamer>,
    thresholds: Thresholds,
    skip_log_level: SkipLogLevel,
    delete_attempts: u32,
    delete_backoff: Duration,
    os: TargetOs,
}

impl ProcessStrategy {
    /// Local filesystem, no pre-move, commit moves into `.done/`, rollback leaves the file.
    pub fn new(lock: ReadLock) -> Self {
        Self {
            lock,
            ops: Arc::new(LocalFileOperations::new()),
            pre_move: None,
            on_commit: CommitAction::default(),
            on_failure: None,
            thresholds: Thresholds::default(),
            skip_log_level: SkipLogLevel::default(),
            delete_attempts: DEFAULT_DELETE_ATTEMPTS,
            delete_backoff: DEFAULT_DELETE_BACKOFF,
            os: TargetOs::current(),
        }
    }

    pub fn with_operations(mut self, ops: Arc<dyn FileOperations>) -> Self {
        self.ops = ops;
        self
    }

    pub fn with_pre_move(mut self, renamer: Option<Renamer>) -> Self {
        self.pre_move = renamer;
        self
    }

    pub fn with_commit_action(mut self, action: CommitAction) -> Self {
        self.on_commit = action;
        self
    }

    pub fn with_failure_move(mut self, renamer: Option<Renamer>) -> Self {
        self.on_failure = renamer;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_skip_log_level(mut self, level: SkipLogLevel) -> Self {
        self.skip_log_level = level;
        self
    }

    pub fn with_delete_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.delete_attempts = attempts.max(1);
        self.delete_backoff = backoff;
        self
    }

    pub fn with_target_os(mut self, os: TargetOs) -> Self {
        self.os = os;
        self
    }

    pub fn read_lock(&self) -> &ReadLock {
        &self.lock
    }

    pub fn commit_action(&self) -> &CommitAction {
        &self.on_commit
    }

    /// Delete marker files left by a previous run, if the lock chain uses markers
    /// and orphan deletion is enabled. Returns an empty report otherwise.
    pub fn prepare_on_startup(&self, scope: &ScanScope, filter: &dyn PathFilter) -> SweepReport {
        match self.lock.marker() {
            Some(marker) if marker.deletes_orphans_on_startup() => {
                let report = OrphanLockSweeper::for_marker(marker).sweep(scope, filter);
                debug!(
                    root = %scope.root.display(),
                    deleted = report.deleted.len(),
                    kept = report.kept.len(),
                    "Orphan lock sweep finished"
                );
                report
            }
            _ => SweepReport::default(),
        }
    }

    /// Try to claim `file`. A skip is `Ok(Begin::Skipped)`, never an error.
    pub fn begin(&self, file: FileRef, cancel: &CancelToken) -> Result<Begin<'_>, ClaimError> {
        if let Some(reason) = self.thresholds.check(&file) {
            self.log_skip(&file, reason);
            return Ok(Begin::Skipped(reason));
        }

        let ctx = LockContext {
            ops: self.ops.as_ref(),
            cancel,
            os: self.os,
        };
        trace!(file = %file, strategy = self.lock.name(), "Acquiring read lock");
        let handle = match self.lock.acquire(&file, &ctx)? {
            LockOutcome::Acquired(handle) => handle,
            LockOutcome::NotAcquired(reason) => {
                self.log_skip(&file, reason);
                return Ok(Begin::Skipped(reason));
            }
        };

        let mut tx = Transaction {
            strategy: self,
            file,
            handle,
            state: TxState::Locked,
        };

        if let Some(renamer) = &self.pre_move {
            let target = renamer.rename(&tx.file);
            if let Err(e) = self.relocate(&tx.file, target.absolute_path()) {
                if let Err(release) = tx.release(ReleasePhase::Abort) {
                    warn!(
                        file = %tx.file,
                        error = %release,
                        "Failed to release lock after pre-move failure"
                    );
                }
                tx.state = TxState::Aborted;
                return Err(e);
            }
            debug!(from = %tx.file, to = %target, "Pre-moved file");
            tx.file = target;
        }
        Ok(Begin::Locked(tx))
    }

    fn log_skip(&self, file: &FileRef, reason: SkipReason) {
        let path = file.absolute_path().display();
        match self.skip_log_level {
            SkipLogLevel::Off => {}
            SkipLogLevel::Trace => tracing::trace!(file = %path, %reason, "Skipping file"),
            SkipLogLevel::Debug => tracing::debug!(file = %path, %reason, "Skipping file"),
            SkipLogLevel::Info => tracing::info!(file = %path, %reason, "Skipping file"),
            SkipLogLevel::Warn => tracing::warn!(file = %path, %reason, "Skipping file"),
            SkipLogLevel::Error => tracing::error!(file = %path, %reason, "Skipping file"),
        }
    }

    /// Rename `from` to `dest`: delete an existing destination, create parents, rename.
    fn relocate(&self, from: &FileRef, dest: &Path) -> Result<(), ClaimError> {
        if from.absolute_path() == dest {
            return Ok(());
        }
        match self.ops.delete_file(dest) {
            Ok(()) => debug!(dest = %dest.display(), "Deleted existing destination before rename"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ClaimError::operation_failed(
                    "cannot delete existing destination",
                    dest,
                    Some(e),
                ));
            }
        }
        if let Some(parent) = dest.parent() {
            self.ops.build_directory(parent).map_err(|e| {
                ClaimError::operation_failed(
                    "cannot create directory (check permissions)",
                    parent,
                    Some(e),
                )
            })?;
        }
        self.ops.rename_file(from.absolute_path(), dest).map_err(|e| {
            ClaimError::operation_failed(
                format!(
                    "cannot rename file {} to {}",
                    from.absolute_path().display(),
                    dest.display()
                ),
                from.absolute_path(),
                Some(e),
            )
        })
    }

    /// Delete with a bounded number of attempts. A file that is gone counts as deleted.
    fn delete_with_retry(&self, file: &FileRef) -> Result<(), ClaimError> {
        let path = file.absolute_path();
        let mut last_err = None;
        for attempt in 1..=self.delete_attempts {
            match self.ops.delete_file(path) {
                Ok(()) => return Ok(()),
                Err(_) if !self.ops.exists(path) => return Ok(()),
                Err(e) => {
                    trace!(
                        file = %file,
                        attempt,
                        error = %e,
                        "File was not deleted; will try again"
                    );
                    last_err = Some(e);
                    if attempt < self.delete_attempts {
                        thread::sleep(self.delete_backoff);
                    }
                }
            }
        }
        Err(ClaimError::operation_failed(
            format!("cannot delete file after {} attempts", self.delete_attempts),
            path,
            last_err,
        ))
    }
}

/// A claimed file. Finish with [`commit`](Self::commit), [`rollback`](Self::rollback)
/// or [`abort`](Self::abort); dropping it unfinished aborts and logs a warning.
#[derive(Debug)]
pub struct Transaction<'a> {
    strategy: &'a ProcessStrategy,
    file: FileRef,
    handle: LockHandle,
    state: TxState,
}

impl Transaction<'_> {
    /// The file as it is now (after any pre-move).
    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn commit(mut self) -> Result<Disposition, ClaimError> {
        self.state = TxState::Committing;
        let released = self.release(ReleasePhase::Commit);
        let strategy = self.strategy;
        let outcome = match &strategy.on_commit {
            CommitAction::Leave => Ok(Disposition::Left(self.file.clone())),
            CommitAction::Delete => {
                strategy.delete_with_retry(&self.file).map(|_| Disposition::Deleted)
            }
            CommitAction::Move(renamer) => {
                let target = renamer.rename(&self.file);
                strategy
                    .relocate(&self.file, target.absolute_path())
                    .map(|_| Disposition::Moved(target))
            }
        };
        self.state = TxState::Done;
        let disposition = outcome?;
        released?;
        debug!(file = %self.file, ?disposition, "Committed");
        Ok(disposition)
    }

    pub fn rollback(mut self) -> Result<Disposition, ClaimError> {
        self.state = TxState::RollingBack;
        let released = self.release(ReleasePhase::Rollback);
        let strategy = self.strategy;
        let outcome = match &strategy.on_failure {
            None => Ok(Disposition::Left(self.file.clone())),
            Some(renamer) => {
                let target = renamer.rename(&self.file);
                strategy
                    .relocate(&self.file, target.absolute_path())
                    .map(|_| Disposition::Moved(target))
            }
        };
        self.state = TxState::Done;
        let disposition = outcome?;
        released?;
        debug!(file = %self.file, ?disposition, "Rolled back");
        Ok(disposition)
    }

    /// Release the lock without touching the file.
    pub fn abort(mut self) -> Result<(), ClaimError> {
        self.state = TxState::Aborted;
        self.release(ReleasePhase::Abort)
    }

    fn release(&mut self, phase: ReleasePhase) -> Result<(), ClaimError> {
        self.strategy
            .lock
            .release(&mut self.handle, phase, self.strategy.ops.as_ref())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TxState::Locked {
            return;
        }
        warn!(file = %self.file, "Transaction dropped while locked; releasing lock");
        self.state = TxState::Aborted;
        if let Err(e) = self.release(ReleasePhase::Abort) {
            warn!(file = %self.file, error = %e, "Failed to release lock of dropped transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::FileStat;

    fn file(len: u64, age: Duration) -> FileRef {
        FileRef::new(
            "/in",
            "/in/a.txt",
            FileStat {
                len,
                modified: SystemTime::now() - age,
            },
        )
    }

    #[test]
    fn thresholds_check_length_before_age() {
        let t = Thresholds {
            min_age: Duration::from_secs(60),
            min_length: 10,
        };
        assert_eq!(t.check(&file(5, Duration::ZERO)), Some(SkipReason::TooSmall));
        assert_eq!(t.check(&file(50, Duration::ZERO)), Some(SkipReason::TooYoung));
        assert_eq!(t.check(&file(50, Duration::from_secs(120))), None);
        assert_eq!(Thresholds::default().check(&file(0, Duration::ZERO)), None);
    }

    #[test]
    fn default_commit_moves_into_done() {
        let CommitAction::Move(renamer) = CommitAction::default() else {
            panic!("default commit should move");
        };
        assert_eq!(
            renamer.destination(&file(1, Duration::ZERO)),
            Path::new("/in/.done/a.txt")
        );
    }
}
