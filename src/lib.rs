//! file_claim: exclusive read-lock coordination for file ingestion.
//!
//! Several consumers (threads, processes or hosts) may watch the same directory.
//! Before one of them processes a file it claims it through a [`ReadLock`]
//! strategy; the [`ProcessStrategy`] then wraps processing in a transaction that
//! commits (move/delete/leave), rolls back (optionally moving the file aside) or
//! aborts, always releasing the lock first.
//!
//! Typical use:
//! - build a [`ClaimConfig`] (XML, CLI or code) and call `build_strategy()`;
//! - run [`ProcessStrategy::prepare_on_startup`] once to clear orphaned markers;
//! - for each listed file, `begin(file, &cancel)` and finish the transaction.

pub mod config;
pub mod errors;
pub mod expression;
pub mod file_ref;
pub mod filter;
pub mod lock;
pub mod ops;
pub mod output;
pub mod platform;
pub mod process;
pub mod renamer;
pub mod repository;
pub mod retry;
pub mod shutdown;

pub use config::{ClaimConfig, LogLevel, ReadLockKind, SkipLogLevel};
pub use errors::{ClaimError, RepositoryError};
pub use expression::Expression;
pub use file_ref::FileRef;
pub use filter::{FileFilter, PathFilter, ScanScope};
pub use lock::{LockHandle, LockOutcome, ReadLock, ReleasePhase, SkipReason};
pub use ops::{FileOperations, FileStat, LocalFileOperations};
pub use process::{Begin, CommitAction, Disposition, ProcessStrategy, Transaction, TxState};
pub use renamer::Renamer;
pub use repository::{FileIdempotentRepository, IdempotentRepository, MemoryIdempotentRepository};
pub use retry::RetryBudget;
pub use shutdown::CancelToken;
