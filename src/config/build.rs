//! Turns a validated [`ClaimConfig`] into the runtime pieces: read lock, filter,
//! renamers and the [`ProcessStrategy`] that ties them together.
//!
//! Read-lock composition:
//!
//! | read_lock            | chain (marker only when `use_marker_file`)     |
//! |----------------------|------------------------------------------------|
//! | `markerFile`         | marker                                         |
//! | `fileLock`           | marker, then OS lock probe                     |
//! | `rename`             | marker, then rename probe                      |
//! | `changed`            | change detection wrapping marker (or nothing)  |
//! | `idempotent`         | idempotent key                                 |
//! | `idempotent-changed` | idempotent key wrapping change detection       |
//! | `idempotent-rename`  | idempotent key wrapping rename probe           |

use std::sync::Arc;
use std::time::Duration;

use super::types::{ClaimConfig, MoveOption, ReadLockKind, RepositoryKind};
use crate::errors::ClaimError;
use crate::expression::Expression;
use crate::filter::{FileFilter, ScanScope};
use crate::lock::{
    ChangeDetectionLock, IdempotentLock, MarkerFileLock, OsFileLock, ReadLock, RenameProbeLock,
};
use crate::platform::TargetOs;
use crate::process::{CommitAction, ProcessStrategy, Thresholds};
use crate::renamer::Renamer;
use crate::repository::{FileIdempotentRepository, IdempotentRepository, MemoryIdempotentRepository};
use crate::retry::RetryBudget;

impl ClaimConfig {
    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::from_millis(self.timeout_millis, self.poll_interval_millis)
    }

    pub fn scan_scope(&self) -> ScanScope {
        ScanScope::new(&self.root)
            .recursive(self.recursive)
            .max_depth(self.max_depth)
    }

    pub fn build_filter(&self) -> Result<FileFilter, ClaimError> {
        let mut filter = FileFilter::new()
            .with_lock_suffix(self.lock_suffix.clone())
            .with_globs(&self.include, &self.exclude)?
            .with_extensions(&self.include_ext, &self.exclude_ext);
        if let Some(re) = &self.include_regex {
            filter = filter.with_include_regex(re)?;
        }
        if let Some(re) = &self.exclude_regex {
            filter = filter.with_exclude_regex(re)?;
        }
        Ok(filter)
    }

    pub fn open_repository(&self) -> Result<Arc<dyn IdempotentRepository>, ClaimError> {
        match self.repository {
            RepositoryKind::Memory => Ok(Arc::new(MemoryIdempotentRepository::new(
                self.repository_max_entries,
            ))),
            RepositoryKind::File => {
                let path = self.repository_path.as_ref().ok_or_else(|| {
                    ClaimError::Config("repository 'file' requires repository_path".into())
                })?;
                Ok(Arc::new(FileIdempotentRepository::open(
                    path,
                    self.repository_max_entries,
                )?))
            }
        }
    }

    /// Build the read-lock chain. `repository` is used by the idempotent kinds;
    /// when `None` one is opened from the config.
    pub fn build_read_lock(
        &self,
        repository: Option<Arc<dyn IdempotentRepository>>,
    ) -> Result<ReadLock, ClaimError> {
        let budget = self.retry_budget();
        let marker = || {
            MarkerFileLock::new()
                .with_suffix(self.lock_suffix.clone())
                .with_delete_orphans(self.delete_orphan_lock_files_on_startup)
        };
        let with_marker = |probe: ReadLock| {
            if self.use_marker_file {
                ReadLock::Composite(vec![ReadLock::MarkerFile(marker()), probe])
            } else {
                probe
            }
        };
        let changed = |inner: ReadLock| {
            ReadLock::ChangeDetection(
                ChangeDetectionLock::new(budget, inner)
                    .with_min_length(self.read_lock_min_length)
                    .with_min_age(Duration::from_millis(self.min_age_millis)),
            )
        };

        let lock = match self.read_lock {
            ReadLockKind::None => ReadLock::None,
            ReadLockKind::MarkerFile => ReadLock::MarkerFile(marker()),
            ReadLockKind::FileLock => with_marker(ReadLock::OsFileLock(OsFileLock::new(budget))),
            ReadLockKind::Rename => {
                with_marker(ReadLock::RenameProbe(RenameProbeLock::new(budget)))
            }
            ReadLockKind::Changed => changed(if self.use_marker_file {
                ReadLock::MarkerFile(marker())
            } else {
                ReadLock::None
            }),
            ReadLockKind::Idempotent => self.idempotent(repository, ReadLock::None)?,
            ReadLockKind::IdempotentChanged => {
                self.idempotent(repository, changed(ReadLock::None))?
            }
            ReadLockKind::IdempotentRename => {
                self.idempotent(repository, ReadLock::RenameProbe(RenameProbeLock::new(budget)))?
            }
        };
        Ok(lock)
    }

    fn idempotent(
        &self,
        repository: Option<Arc<dyn IdempotentRepository>>,
        inner: ReadLock,
    ) -> Result<ReadLock, ClaimError> {
        let repository = match repository {
            Some(r) => r,
            None => self.open_repository()?,
        };
        let mut lock = IdempotentLock::new(repository, inner)
            .with_remove_on_commit(self.remove_key_on_commit)
            .with_remove_on_rollback(self.remove_key_on_rollback)
            .with_release_delay(
                Duration::from_millis(self.idempotent_release_delay_millis),
                self.idempotent_release_async,
            );
        if let Some(expr) = &self.idempotent_key_expression {
            lock = lock.with_key_expression(Expression::parse(expr)?);
        }
        Ok(ReadLock::Idempotent(lock))
    }

    pub fn build_strategy(&self) -> Result<ProcessStrategy, ClaimError> {
        self.build_strategy_with(None)
    }

    /// Validate, then assemble the strategy (sharing `repository` if given).
    pub fn build_strategy_with(
        &self,
        repository: Option<Arc<dyn IdempotentRepository>>,
    ) -> Result<ProcessStrategy, ClaimError> {
        self.validate()?;
        let os = TargetOs::current();
        let lock = self.build_read_lock(repository)?;

        let on_commit = if self.noop {
            CommitAction::Leave
        } else if self.delete {
            CommitAction::Delete
        } else {
            match renamer(&self.commit_move, os)? {
                Some(r) => CommitAction::Move(r),
                None => CommitAction::default(),
            }
        };

        Ok(ProcessStrategy::new(lock)
            .with_pre_move(renamer(&self.pre_move, os)?)
            .with_commit_action(on_commit)
            .with_failure_move(renamer(&self.failure_move, os)?)
            .with_thresholds(Thresholds {
                min_age: Duration::from_millis(self.min_age_millis),
                min_length: self.min_length,
            })
            .with_skip_log_level(self.skip_log_level)
            .with_target_os(os))
    }
}

fn renamer(opt: &MoveOption, os: TargetOs) -> Result<Option<Renamer>, ClaimError> {
    if let Some(expr) = &opt.expression {
        return Renamer::from_move_option(expr, os).map(Some);
    }
    if opt.prefix.is_some() || opt.postfix.is_some() {
        return Ok(Some(Renamer::affix(opt.prefix.clone(), opt.postfix.clone())));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(cfg: &ClaimConfig) -> ReadLock {
        cfg.build_read_lock(Some(Arc::new(MemoryIdempotentRepository::default())))
            .unwrap()
    }

    #[test]
    fn file_lock_composes_marker_first() {
        let cfg = ClaimConfig {
            read_lock: ReadLockKind::FileLock,
            ..Default::default()
        };
        match kind(&cfg) {
            ReadLock::Composite(chain) => {
                assert!(matches!(chain[0], ReadLock::MarkerFile(_)));
                assert!(matches!(chain[1], ReadLock::OsFileLock(_)));
            }
            other => panic!("unexpected chain: {other:?}"),
        }
    }

    #[test]
    fn changed_without_marker_wraps_none() {
        let cfg = ClaimConfig {
            read_lock: ReadLockKind::Changed,
            use_marker_file: false,
            ..Default::default()
        };
        let lock = kind(&cfg);
        assert!(lock.marker().is_none());
        match lock {
            ReadLock::ChangeDetection(c) => assert!(matches!(c.inner(), ReadLock::None)),
            other => panic!("unexpected chain: {other:?}"),
        }
    }

    #[test]
    fn changed_expects_data_unless_told_otherwise() {
        let cfg = ClaimConfig {
            read_lock: ReadLockKind::Changed,
            ..Default::default()
        };
        assert_eq!(cfg.min_length, 0);
        match kind(&cfg) {
            ReadLock::ChangeDetection(c) => assert_eq!(c.min_length(), 1),
            other => panic!("unexpected chain: {other:?}"),
        }

        let cfg = ClaimConfig {
            read_lock: ReadLockKind::Changed,
            read_lock_min_length: 0,
            ..Default::default()
        };
        match kind(&cfg) {
            ReadLock::ChangeDetection(c) => assert_eq!(c.min_length(), 0),
            other => panic!("unexpected chain: {other:?}"),
        }
    }

    #[test]
    fn idempotent_rename_chain() {
        let cfg = ClaimConfig {
            read_lock: ReadLockKind::IdempotentRename,
            idempotent_key_expression: Some("${file:onlyname}".into()),
            ..Default::default()
        };
        match kind(&cfg) {
            ReadLock::Idempotent(i) => assert!(matches!(i.inner(), ReadLock::RenameProbe(_))),
            other => panic!("unexpected chain: {other:?}"),
        }
    }

    #[test]
    fn bad_key_expression_is_rejected() {
        let cfg = ClaimConfig {
            read_lock: ReadLockKind::Idempotent,
            idempotent_key_expression: Some("${file:nope}".into()),
            ..Default::default()
        };
        assert!(matches!(
            cfg.build_read_lock(None),
            Err(ClaimError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn noop_leaves_and_delete_deletes() {
        let cfg = ClaimConfig {
            noop: true,
            ..Default::default()
        };
        assert_eq!(cfg.build_strategy().unwrap().commit_action(), &CommitAction::Leave);
        let cfg = ClaimConfig {
            delete: true,
            ..Default::default()
        };
        assert_eq!(cfg.build_strategy().unwrap().commit_action(), &CommitAction::Delete);
    }
}
