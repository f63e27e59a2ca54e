//! Config validation logic.
//! Rejects contradictory option combinations before any strategy is built, and
//! checks the consumer root when the binary is about to use it.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::types::{ClaimConfig, MoveOption, RepositoryKind};
use crate::errors::ClaimError;

fn invalid(msg: impl Into<String>) -> ClaimError {
    ClaimError::Config(msg.into())
}

impl ClaimConfig {
    /// Check option consistency. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ClaimError> {
        if self.poll_interval_millis == 0 {
            return Err(invalid("poll_interval_millis must be greater than 0"));
        }
        if self.read_lock.polls()
            && self.timeout_millis > 0
            && self.timeout_millis <= self.poll_interval_millis
        {
            return Err(invalid(format!(
                "timeout_millis ({}) must be higher than poll_interval_millis ({}) for read lock {}",
                self.timeout_millis, self.poll_interval_millis, self.read_lock
            )));
        }
        if self.lock_suffix.is_empty() {
            return Err(invalid("lock_suffix must not be empty"));
        }

        check_move_option(&self.pre_move, "pre_move")?;
        check_move_option(&self.commit_move, "move")?;
        check_move_option(&self.failure_move, "move_failed")?;

        if self.delete && self.commit_move.is_set() {
            return Err(invalid("delete and move cannot both be set"));
        }
        if self.noop && self.delete {
            return Err(invalid("noop and delete cannot both be set"));
        }
        if self.noop && self.commit_move.is_set() {
            return Err(invalid("noop and move cannot both be set"));
        }
        if self.repository == RepositoryKind::File && self.repository_path.is_none() {
            return Err(invalid("repository 'file' requires repository_path"));
        }
        if self.repository_max_entries == 0 {
            return Err(invalid("repository_max_entries must be greater than 0"));
        }
        debug!(read_lock = %self.read_lock, root = %self.root.display(), "Config validated");
        Ok(())
    }

    /// The root must exist, be a directory and be listable.
    pub fn validate_root(&self) -> Result<(), ClaimError> {
        let root = &self.root;
        if !root.exists() {
            return Err(invalid(format!("root does not exist: {}", root.display())));
        }
        if !root.is_dir() {
            return Err(invalid(format!("root is not a directory: {}", root.display())));
        }
        ensure_readable(root)?;
        info!(root = %root.display(), read_lock = %self.read_lock, "Consumer root ready");
        Ok(())
    }
}

fn check_move_option(opt: &MoveOption, name: &str) -> Result<(), ClaimError> {
    if opt.expression.is_some() && (opt.prefix.is_some() || opt.postfix.is_some()) {
        return Err(invalid(format!(
            "{name} cannot combine an expression with prefix/postfix"
        )));
    }
    if opt.expression.as_deref().is_some_and(|e| e.trim().is_empty()) {
        return Err(invalid(format!("{name} must not be empty")));
    }
    Ok(())
}

fn ensure_readable(path: &Path) -> Result<(), ClaimError> {
    fs::read_dir(path).map_err(|e| ClaimError::io("read root directory", path, e))?;
    Ok(())
}
