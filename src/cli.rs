//! CLI definition and parsing.
//!
//! Notes:
//! - Flags override values loaded from XML (explicit --config, FILE_CLAIM_CONFIG, default path).
//! - --debug is a shorthand for --log-level debug.
//! - `claim` with no FILES processes every candidate under the root once.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use file_claim::config::RepositoryKind;
use file_claim::{ClaimConfig, LogLevel, ReadLockKind, SkipLogLevel};

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Claim files exclusively before processing them, then move, delete or leave them"
)]
pub struct Args {
    /// Config XML to load instead of FILE_CLAIM_CONFIG / the default location.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'd',
        long,
        global = true,
        help = "Enable debug logging (shorthand for --log-level debug)"
    )]
    pub debug: bool,

    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_hint = ValueHint::FilePath,
        help = "Also write logs to this file"
    )]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs in structured JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Claim files, run a command on each, then commit or roll back by its exit status.
    Claim(ClaimArgs),
    /// Delete orphaned lock files under the root and exit.
    Sweep(ScopeArgs),
    /// Print where the config is loaded from and the effective settings.
    PrintConfig,
    /// Write a template config (to the default location unless a path is given).
    InitConfig {
        #[arg(value_hint = ValueHint::FilePath)]
        path: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ScopeArgs {
    #[arg(long, value_hint = ValueHint::DirPath, help = "Directory being consumed")]
    pub root: Option<PathBuf>,

    #[arg(short = 'r', long, help = "Descend into sub-directories")]
    pub recursive: bool,

    #[arg(long, value_name = "GLOB", help = "Only consider paths matching this glob (repeatable)")]
    pub include: Vec<String>,

    #[arg(long, value_name = "GLOB", help = "Ignore paths matching this glob (repeatable)")]
    pub exclude: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ClaimArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[arg(
        long,
        help = "none, markerFile, fileLock, rename, changed, idempotent, idempotent-changed, idempotent-rename"
    )]
    pub read_lock: Option<ReadLockKind>,

    #[arg(
        long,
        value_name = "MS",
        help = "Give up waiting for a lock after this long (0 = forever)"
    )]
    pub timeout_ms: Option<u64>,

    #[arg(long, value_name = "MS", help = "Delay between lock attempts")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, help = "Do not add a marker file to fileLock / rename / changed")]
    pub no_marker_file: bool,

    #[arg(
        long = "move",
        value_name = "DIR|EXPR",
        help = "Where committed files go (default .done)"
    )]
    pub commit_move: Option<String>,

    #[arg(long, value_name = "DIR|EXPR", help = "Where files go when the command fails")]
    pub move_failed: Option<String>,

    #[arg(
        long,
        value_name = "DIR|EXPR",
        help = "Move claimed files here before running the command"
    )]
    pub pre_move: Option<String>,

    #[arg(long, conflicts_with = "noop", help = "Delete files on commit")]
    pub delete: bool,

    #[arg(long, help = "Leave files in place on commit")]
    pub noop: bool,

    #[arg(long, value_name = "MS", help = "Skip files modified more recently than this")]
    pub min_age_ms: Option<u64>,

    #[arg(long, value_name = "BYTES", help = "Skip files smaller than this")]
    pub min_length: Option<u64>,

    #[arg(
        long,
        value_name = "BYTES",
        help = "Size a 'changed' file must reach before it is claimed"
    )]
    pub read_lock_min_length: Option<u64>,

    #[arg(long, help = "Level for 'file skipped' events: off, trace, debug, info, warn, error")]
    pub skip_log_level: Option<SkipLogLevel>,

    #[arg(
        long,
        value_hint = ValueHint::FilePath,
        help = "Keep idempotent keys in this file (shared between processes)"
    )]
    pub repository_path: Option<PathBuf>,

    #[arg(long, value_name = "EXPR", help = "Idempotent key expression, e.g. ${file:onlyname}")]
    pub idempotent_key: Option<String>,

    /// Files to claim (relative to the root or absolute). Empty = every candidate under the root.
    #[arg(value_name = "FILES", value_hint = ValueHint::FilePath)]
    pub files: Vec<PathBuf>,

    /// Command run per claimed file; `{}` is replaced by the path, otherwise the path is appended.
    #[arg(last = true, value_name = "CMD")]
    pub exec: Vec<String>,
}

impl ScopeArgs {
    fn apply(&self, cfg: &mut ClaimConfig) {
        if let Some(root) = &self.root {
            cfg.root = root.clone();
        }
        if self.recursive {
            cfg.recursive = true;
        }
        if !self.include.is_empty() {
            cfg.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            cfg.exclude = self.exclude.clone();
        }
    }
}

impl ClaimArgs {
    fn apply(&self, cfg: &mut ClaimConfig) {
        self.scope.apply(cfg);
        if let Some(kind) = self.read_lock {
            cfg.read_lock = kind;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.timeout_millis = ms;
        }
        if let Some(ms) = self.poll_interval_ms {
            cfg.poll_interval_millis = ms;
        }
        if self.no_marker_file {
            cfg.use_marker_file = false;
        }
        if let Some(m) = &self.commit_move {
            cfg.commit_move.expression = Some(m.clone());
        }
        if let Some(m) = &self.move_failed {
            cfg.failure_move.expression = Some(m.clone());
        }
        if let Some(m) = &self.pre_move {
            cfg.pre_move.expression = Some(m.clone());
        }
        if self.delete {
            cfg.delete = true;
            cfg.noop = false;
        }
        if self.noop {
            cfg.noop = true;
            cfg.delete = false;
        }
        if let Some(ms) = self.min_age_ms {
            cfg.min_age_millis = ms;
        }
        if let Some(len) = self.min_length {
            cfg.min_length = len;
        }
        if let Some(len) = self.read_lock_min_length {
            cfg.read_lock_min_length = len;
        }
        if let Some(lvl) = self.skip_log_level {
            cfg.skip_log_level = lvl;
        }
        if let Some(path) = &self.repository_path {
            cfg.repository = RepositoryKind::File;
            cfg.repository_path = Some(path.clone());
        }
        if let Some(key) = &self.idempotent_key {
            cfg.idempotent_key_expression = Some(key.clone());
        }
    }
}

impl Args {
    /// Precedence: --debug > --log-level value > None (use config value).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded config (in place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut ClaimConfig) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(path) = &self.log_file {
            cfg.log_file = Some(path.clone());
        }
        match &self.command {
            Command::Claim(claim) => claim.apply(cfg),
            Command::Sweep(scope) => scope.apply(cfg),
            Command::PrintConfig | Command::InitConfig { .. } => {}
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_flags_override_config() {
        let args = Args::parse_from([
            "file_claim",
            "--debug",
            "claim",
            "--root",
            "/in",
            "--read-lock",
            "idempotent-rename",
            "--timeout-ms",
            "0",
            "--repository-path",
            "/var/keys",
            "a.txt",
            "--",
            "cat",
            "{}",
        ]);
        let mut cfg = ClaimConfig::default();
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.root, PathBuf::from("/in"));
        assert_eq!(cfg.read_lock, ReadLockKind::IdempotentRename);
        assert_eq!(cfg.timeout_millis, 0);
        assert_eq!(cfg.repository, RepositoryKind::File);
        let Command::Claim(claim) = &args.command else {
            panic!("expected claim");
        };
        assert_eq!(claim.files, vec![PathBuf::from("a.txt")]);
        assert_eq!(claim.exec, vec!["cat".to_string(), "{}".to_string()]);
    }

    #[test]
    fn unset_flags_keep_config_values() {
        let args = Args::parse_from(["file_claim", "sweep"]);
        let mut cfg = ClaimConfig {
            recursive: true,
            read_lock: ReadLockKind::MarkerFile,
            ..Default::default()
        };
        args.apply_overrides(&mut cfg);
        assert!(cfg.recursive);
        assert_eq!(cfg.read_lock, ReadLockKind::MarkerFile);
    }

    #[test]
    fn delete_and_noop_conflict() {
        assert!(Args::try_parse_from(["file_claim", "claim", "--delete", "--noop"]).is_err());
    }
}
