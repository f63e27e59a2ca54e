//! Idempotent decorator: claim a key in a shared repository before delegating.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{LockContext, LockHandle, LockOutcome, ReadLock, ReleasePhase, SkipReason};
use crate::errors::ClaimError;
use crate::expression::Expression;
use crate::file_ref::FileRef;
use crate::ops::FileOperations;
use crate::repository::IdempotentRepository;

#[derive(Debug, Clone)]
pub struct IdempotentLock {
    repository: Arc<dyn IdempotentRepository>,
    key_expression: Option<Expression>,
    remove_on_commit: bool,
    remove_on_rollback: bool,
    release_delay: Duration,
    release_async: bool,
    inner: Box<ReadLock>,
}

/// Key claimed by this consumer (`None` once released) plus the inner handle.
#[derive(Debug)]
pub struct IdempotentHandle {
    key: Option<String>,
    inner: Box<LockHandle>,
}

impl IdempotentHandle {
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl IdempotentLock {
    pub fn new(repository: Arc<dyn IdempotentRepository>, inner: ReadLock) -> Self {
        Self {
            repository,
            key_expression: None,
            remove_on_commit: false,
            remove_on_rollback: true,
            release_delay: Duration::ZERO,
            release_async: false,
            inner: Box::new(inner),
        }
    }

    pub fn with_key_expression(mut self, expr: Expression) -> Self {
        self.key_expression = Some(expr);
        self
    }

    pub fn with_remove_on_commit(mut self, remove: bool) -> Self {
        self.remove_on_commit = remove;
        self
    }

    pub fn with_remove_on_rollback(mut self, remove: bool) -> Self {
        self.remove_on_rollback = remove;
        self
    }

    /// Wait `delay` before updating the repository on release, optionally on a
    /// detached thread so the caller is not held up.
    pub fn with_release_delay(mut self, delay: Duration, run_async: bool) -> Self {
        self.release_delay = delay;
        self.release_async = run_async;
        self
    }

    pub fn inner(&self) -> &ReadLock {
        &self.inner
    }

    pub fn key_for(&self, file: &FileRef) -> String {
        match &self.key_expression {
            Some(expr) => expr.evaluate(file),
            None => file.lock_key_path().to_string_lossy().into_owned(),
        }
    }

    pub(super) fn acquire(
        &self,
        file: &FileRef,
        ctx: &LockContext<'_>,
    ) -> Result<LockOutcome, ClaimError> {
        let key = self.key_for(file);
        if !self.repository.add(&key)? {
            trace!(file = %file, key = %key, "Idempotent key already claimed");
            return Ok(LockOutcome::NotAcquired(SkipReason::Held));
        }

        match self.inner.acquire(file, ctx) {
            Ok(LockOutcome::Acquired(inner)) => Ok(LockOutcome::Acquired(LockHandle::Idempotent(
                IdempotentHandle {
                    key: Some(key),
                    inner: Box::new(inner),
                },
            ))),
            other => {
                if let Err(e) = self.repository.remove(&key) {
                    warn!(
                        key = %key,
                        error = %e,
                        "Failed to remove idempotent key after inner lock was not acquired"
                    );
                }
                other
            }
        }
    }

    pub(super) fn release(
        &self,
        handle: &mut IdempotentHandle,
        phase: ReleasePhase,
        ops: &dyn FileOperations,
    ) -> Result<(), ClaimError> {
        let inner_result = self.inner.release(&mut handle.inner, phase, ops);

        if let Some(key) = handle.key.take() {
            let remove = match phase {
                ReleasePhase::Commit => self.remove_on_commit,
                ReleasePhase::Rollback => self.remove_on_rollback,
                ReleasePhase::Abort => true,
            };
            self.update_repository(key, remove)?;
        }
        inner_result
    }

    fn update_repository(&self, key: String, remove: bool) -> Result<(), ClaimError> {
        if self.release_delay.is_zero() {
            return apply_release(self.repository.as_ref(), &key, remove);
        }
        if !self.release_async {
            thread::sleep(self.release_delay);
            return apply_release(self.repository.as_ref(), &key, remove);
        }

        let repository = Arc::clone(&self.repository);
        let delay = self.release_delay;
        let deferred_key = key.clone();
        let spawned = thread::Builder::new()
            .name("file-claim-release".into())
            .spawn(move || {
                thread::sleep(delay);
                if let Err(e) = apply_release(repository.as_ref(), &deferred_key, remove) {
                    warn!(key = %deferred_key, error = %e, "Delayed idempotent release failed");
                }
            });
        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(key = %key, error = %e, "Cannot spawn release thread; releasing inline");
                thread::sleep(self.release_delay);
                apply_release(self.repository.as_ref(), &key, remove)
            }
        }
    }
}

fn apply_release(
    repository: &dyn IdempotentRepository,
    key: &str,
    remove: bool,
) -> Result<(), ClaimError> {
    if remove {
        repository.remove(key)?;
        debug!(key = %key, "Removed idempotent key");
    } else {
        repository.confirm(key)?;
        debug!(key = %key, "Confirmed idempotent key");
    }
    Ok(())
}
