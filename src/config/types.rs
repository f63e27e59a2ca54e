//! Core configuration types.
//! - ClaimConfig holds every read-lock and transaction setting with defaults.
//! - LogLevel is program verbosity; SkipLogLevel is the level used for "file skipped" events.
//! - ReadLockKind / RepositoryKind name the strategies selectable from config.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::lock::{DEFAULT_MARKER_SUFFIX, DEFAULT_MIN_LENGTH};
use crate::repository::DEFAULT_MAX_ENTRIES;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    #[default]
    Normal,
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Case-insensitive; accepts a few common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" | "warn" => Some(LogLevel::Normal),
            "info" | "verbose" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        })
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Level at which skipped files are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipLogLevel {
    Off,
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for SkipLogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(SkipLogLevel::Off),
            "trace" => Ok(SkipLogLevel::Trace),
            "debug" => Ok(SkipLogLevel::Debug),
            "info" => Ok(SkipLogLevel::Info),
            "warn" | "warning" => Ok(SkipLogLevel::Warn),
            "error" => Ok(SkipLogLevel::Error),
            _ => Err(format!("invalid skip log level: '{s}'")),
        }
    }
}

impl fmt::Display for SkipLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipLogLevel::Off => "off",
            SkipLogLevel::Trace => "trace",
            SkipLogLevel::Debug => "debug",
            SkipLogLevel::Info => "info",
            SkipLogLevel::Warn => "warn",
            SkipLogLevel::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadLockKind {
    #[default]
    None,
    MarkerFile,
    FileLock,
    Rename,
    Changed,
    Idempotent,
    IdempotentChanged,
    IdempotentRename,
}

impl ReadLockKind {
    /// Kinds that run a poll/timeout loop (timeout must exceed the poll interval).
    pub fn polls(self) -> bool {
        matches!(
            self,
            ReadLockKind::FileLock
                | ReadLockKind::Rename
                | ReadLockKind::Changed
                | ReadLockKind::IdempotentChanged
                | ReadLockKind::IdempotentRename
        )
    }

    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            ReadLockKind::Idempotent
                | ReadLockKind::IdempotentChanged
                | ReadLockKind::IdempotentRename
        )
    }
}

impl FromStr for ReadLockKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "none" => Ok(ReadLockKind::None),
            "markerfile" => Ok(ReadLockKind::MarkerFile),
            "filelock" => Ok(ReadLockKind::FileLock),
            "rename" => Ok(ReadLockKind::Rename),
            "changed" => Ok(ReadLockKind::Changed),
            "idempotent" => Ok(ReadLockKind::Idempotent),
            "idempotentchanged" => Ok(ReadLockKind::IdempotentChanged),
            "idempotentrename" => Ok(ReadLockKind::IdempotentRename),
            _ => Err(format!("invalid read lock: '{s}'")),
        }
    }
}

impl fmt::Display for ReadLockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadLockKind::None => "none",
            ReadLockKind::MarkerFile => "markerFile",
            ReadLockKind::FileLock => "fileLock",
            ReadLockKind::Rename => "rename",
            ReadLockKind::Changed => "changed",
            ReadLockKind::Idempotent => "idempotent",
            ReadLockKind::IdempotentChanged => "idempotent-changed",
            ReadLockKind::IdempotentRename => "idempotent-rename",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositoryKind {
    #[default]
    Memory,
    File,
}

impl FromStr for RepositoryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RepositoryKind::Memory),
            "file" => Ok(RepositoryKind::File),
            _ => Err(format!("invalid repository: '{s}'")),
        }
    }
}

/// One move option: either a directory/expression, or a prefix/postfix pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveOption {
    pub expression: Option<String>,
    pub prefix: Option<String>,
    pub postfix: Option<String>,
}

impl MoveOption {
    pub fn is_set(&self) -> bool {
        self.expression.is_some() || self.prefix.is_some() || self.postfix.is_some()
    }
}

/// Runtime configuration for a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimConfig {
    /// Directory being consumed; relative file names and sweeps start here
    pub root: PathBuf,
    pub read_lock: ReadLockKind,
    /// 0 = unbounded
    pub timeout_millis: u64,
    pub poll_interval_millis: u64,
    /// Compose a marker file after fileLock / rename / changed
    pub use_marker_file: bool,
    pub delete_orphan_lock_files_on_startup: bool,
    pub lock_suffix: String,
    pub idempotent_key_expression: Option<String>,
    pub remove_key_on_commit: bool,
    pub remove_key_on_rollback: bool,
    pub idempotent_release_delay_millis: u64,
    pub idempotent_release_async: bool,
    pub min_age_millis: u64,
    pub min_length: u64,
    /// Size a `changed` file must reach before it counts as stable
    pub read_lock_min_length: u64,
    pub skip_log_level: SkipLogLevel,
    pub pre_move: MoveOption,
    pub commit_move: MoveOption,
    pub failure_move: MoveOption,
    pub delete: bool,
    pub noop: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_regex: Option<String>,
    pub exclude_regex: Option<String>,
    pub include_ext: Vec<String>,
    pub exclude_ext: Vec<String>,
    pub recursive: bool,
    pub max_depth: Option<usize>,
    pub repository: RepositoryKind,
    pub repository_path: Option<PathBuf>,
    pub repository_max_entries: usize,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            read_lock: ReadLockKind::None,
            timeout_millis: 10_000,
            poll_interval_millis: 1_000,
            use_marker_file: true,
            delete_orphan_lock_files_on_startup: true,
            lock_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
            idempotent_key_expression: None,
            remove_key_on_commit: false,
            remove_key_on_rollback: true,
            idempotent_release_delay_millis: 0,
            idempotent_release_async: false,
            min_age_millis: 0,
            min_length: 0,
            read_lock_min_length: DEFAULT_MIN_LENGTH,
            skip_log_level: SkipLogLevel::Debug,
            pre_move: MoveOption::default(),
            commit_move: MoveOption::default(),
            failure_move: MoveOption::default(),
            delete: false,
            noop: false,
            include: Vec::new(),
            exclude: Vec::new(),
            include_regex: None,
            exclude_regex: None,
            include_ext: Vec::new(),
            exclude_ext: Vec::new(),
            recursive: false,
            max_depth: None,
            repository: RepositoryKind::Memory,
            repository_path: None,
            repository_max_entries: DEFAULT_MAX_ENTRIES,
            log_level: LogLevel::Normal,
            log_file: None,
        }
    }
}

impl ClaimConfig {
    /// Defaults with an explicit root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lock_names_parse_loosely() {
        assert_eq!("markerFile".parse(), Ok(ReadLockKind::MarkerFile));
        assert_eq!("idempotent-changed".parse(), Ok(ReadLockKind::IdempotentChanged));
        assert_eq!("IDEMPOTENT_RENAME".parse(), Ok(ReadLockKind::IdempotentRename));
        assert!("exclusive".parse::<ReadLockKind>().is_err());
    }

    #[test]
    fn only_polling_kinds_poll() {
        assert!(ReadLockKind::FileLock.polls());
        assert!(!ReadLockKind::MarkerFile.polls());
        assert!(!ReadLockKind::Idempotent.polls());
    }

    #[test]
    fn skip_level_round_trips_display() {
        for lvl in [SkipLogLevel::Off, SkipLogLevel::Warn, SkipLogLevel::Debug] {
            assert_eq!(lvl.to_string().parse::<SkipLogLevel>(), Ok(lvl));
        }
    }
}
