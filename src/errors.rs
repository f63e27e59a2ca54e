//! Typed error definitions for file_claim.
//!
//! "Lock not acquired" is never an error: it is reported as
//! [`LockOutcome::NotAcquired`](crate::lock::LockOutcome). Everything here is either
//! fatal for the file being claimed or a configuration mistake.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::ops::describe_io;

#[derive(Debug, Error)]
pub enum ClaimError {
    /// An I/O failure the retry policy could not absorb.
    #[error("{}", describe_io(.op, .path, .source))]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Commit/rollback action failed terminally (delete retries exhausted, rename refused).
    #[error("{message}: {}", .path.display())]
    OperationFailed {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<io::Error>,
    },

    #[error("idempotent repository failure: {0}")]
    Repository(#[from] RepositoryError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("invalid glob pattern '{pattern}'")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("invalid regular expression '{pattern}'")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ClaimError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ClaimError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn operation_failed(
        message: impl Into<String>,
        path: impl Into<PathBuf>,
        source: Option<io::Error>,
    ) -> Self {
        ClaimError::OperationFailed {
            message: message.into(),
            path: path.into(),
            source,
        }
    }

    /// Short stable identifier, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimError::Io { .. } => "io",
            ClaimError::OperationFailed { .. } => "operation_failed",
            ClaimError::Repository(_) => "repository",
            ClaimError::Config(_) => "config",
            ClaimError::InvalidExpression { .. } => "invalid_expression",
            ClaimError::InvalidGlob { .. } => "invalid_glob",
            ClaimError::InvalidRegex { .. } => "invalid_regex",
        }
    }
}

/// Failures reported by an [`IdempotentRepository`](crate::repository::IdempotentRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository store '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid idempotent key {0:?}: keys must be non-empty and single-line")]
    InvalidKey(String),

    #[error("repository state poisoned by a panicked holder")]
    Poisoned,

    /// For repository implementations living outside this crate.
    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_message_carries_op_and_path() {
        let err = ClaimError::io(
            "open for lock probe",
            "/in/a.txt",
            io::Error::from(io::ErrorKind::NotFound),
        );
        let msg = err.to_string();
        assert!(msg.contains("open for lock probe"), "{msg}");
        assert!(msg.contains("/in/a.txt"), "{msg}");
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn operation_failed_keeps_source() {
        let err = ClaimError::operation_failed(
            "cannot delete file after 3 attempts",
            "/in/a.txt",
            Some(io::Error::from(io::ErrorKind::PermissionDenied)),
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("cannot delete file after 3 attempts"));
    }
}
