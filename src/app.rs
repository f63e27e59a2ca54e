//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the interrupt handler and
//! dispatches the subcommand.

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use file_claim::config::{
    CONFIG_ENV, create_template_config, default_config_path, resolve_config,
};
use file_claim::lock::OrphanLockSweeper;
use file_claim::output as out;
use file_claim::{
    Begin, CancelToken, ClaimConfig, ClaimError, Disposition, FileRef, ProcessStrategy, SkipReason,
};

use crate::cli::{Args, ClaimArgs, Command};
use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // These two never touch files under the root; handle them before logging init.
    match &args.command {
        Command::PrintConfig => return print_config(&args),
        Command::InitConfig { path } => return init_config(path.as_deref()),
        Command::Claim(_) | Command::Sweep(_) => {}
    }

    let mut cfg = resolve_config(args.config.as_deref())?;
    args.apply_overrides(&mut cfg);

    let guard_opt = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
        e
    })?;

    // Dropping the guard on SIGINT flushes the file appender.
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    let cancel = CancelToken::new();
    {
        let guard_slot = Arc::clone(&guard_slot);
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            cancel.cancel();
            out::print_warn("Received interrupt; finishing claimed files and stopping...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("install interrupt handler")?;
    }

    debug!(?args, "Starting file_claim");

    let result = match &args.command {
        Command::Claim(claim) => run_claim(&cfg, claim, &cancel),
        Command::Sweep(_) => run_sweep(&cfg),
        Command::PrintConfig | Command::InitConfig { .. } => Ok(()),
    };

    if let Err(e) = &result {
        match e.downcast_ref::<ClaimError>() {
            Some(ce) => error!(kind = ce.kind(), error = %ce, "file_claim failed"),
            None => error!(error = ?e, "file_claim failed"),
        }
    }

    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn print_config(args: &Args) -> Result<()> {
    if let Some(p) = &args.config {
        out::print_info(&format!("Using --config:\n  {}", p.display()));
    } else if let Some(p) = std::env::var_os(CONFIG_ENV) {
        out::print_info(&format!(
            "Using {CONFIG_ENV}:\n  {}",
            Path::new(&p).display()
        ));
    } else {
        match default_config_path() {
            Some(p) if p.exists() => {
                out::print_info(&format!("Using default config:\n  {}", p.display()))
            }
            Some(p) => out::print_info(&format!(
                "No config at the default location ({}); built-in defaults apply. Run `file_claim init-config` to create one.",
                p.display()
            )),
            None => {
                out::print_warn("Could not determine a default config path; built-in defaults apply.")
            }
        }
    }

    let mut cfg = resolve_config(args.config.as_deref())?;
    args.apply_overrides(&mut cfg);
    for (key, value) in effective_settings(&cfg) {
        out::print_user(&format!("{key} = {value}"));
    }
    Ok(())
}

fn effective_settings(cfg: &ClaimConfig) -> Vec<(&'static str, String)> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    vec![
        ("root", cfg.root.display().to_string()),
        ("read_lock", cfg.read_lock.to_string()),
        ("timeout_millis", cfg.timeout_millis.to_string()),
        ("poll_interval_millis", cfg.poll_interval_millis.to_string()),
        ("use_marker_file", cfg.use_marker_file.to_string()),
        ("lock_suffix", cfg.lock_suffix.clone()),
        ("min_length", cfg.min_length.to_string()),
        ("read_lock_min_length", cfg.read_lock_min_length.to_string()),
        ("move", opt(&cfg.commit_move.expression)),
        ("move_failed", opt(&cfg.failure_move.expression)),
        ("pre_move", opt(&cfg.pre_move.expression)),
        ("delete", cfg.delete.to_string()),
        ("noop", cfg.noop.to_string()),
        ("skip_log_level", cfg.skip_log_level.to_string()),
        ("log_level", cfg.log_level.to_string()),
    ]
}

fn init_config(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().context("could not determine a default config path")?,
    };
    create_template_config(&path)?;
    out::print_success(&format!("A template config was written to: {}", path.display()));
    out::print_info(&format!(
        "Edit it, then run `file_claim claim`. To use another location pass --config or set {CONFIG_ENV}."
    ));
    Ok(())
}

fn run_sweep(cfg: &ClaimConfig) -> Result<()> {
    cfg.validate_root()?;
    let filter = cfg.build_filter()?;
    let report = OrphanLockSweeper::new(cfg.lock_suffix.clone()).sweep(&cfg.scan_scope(), &filter);
    for path in &report.deleted {
        out::print_user(&format!("deleted {}", path.display()));
    }
    out::print_info(&format!(
        "Sweep finished: {} deleted, {} kept, {} failed",
        report.deleted.len(),
        report.kept.len(),
        report.failed.len()
    ));
    if !report.failed.is_empty() {
        bail!("{} lock file(s) could not be deleted", report.failed.len());
    }
    Ok(())
}

/// What happened to one file.
enum FileOutcome {
    Skipped(SkipReason),
    Committed(Disposition),
    RolledBack(Disposition),
}

fn run_claim(cfg: &ClaimConfig, args: &ClaimArgs, cancel: &CancelToken) -> Result<()> {
    cfg.validate_root()?;
    let strategy = cfg.build_strategy()?;
    let filter = cfg.build_filter()?;
    let scope = cfg.scan_scope();

    let swept = strategy.prepare_on_startup(&scope, &filter);
    if !swept.deleted.is_empty() {
        out::print_warn(&format!("Deleted {} orphaned lock file(s)", swept.deleted.len()));
    }

    let files: Vec<PathBuf> = if args.files.is_empty() {
        scope.candidates(&filter)
    } else {
        args.files.clone()
    };
    info!(
        root = %cfg.root.display(),
        files = files.len(),
        strategy = strategy.read_lock().name(),
        "Claiming files"
    );

    let failures = AtomicUsize::new(0);
    files.par_iter().for_each(|path| {
        match claim_one(&strategy, &cfg.root, path, &args.exec, cancel) {
            Ok(FileOutcome::Skipped(reason)) => {
                out::print_skip(&format!("{}: {reason}", path.display()));
            }
            Ok(FileOutcome::Committed(d)) => out::print_success(&describe(path, &d)),
            Ok(FileOutcome::RolledBack(d)) => {
                failures.fetch_add(1, Ordering::Relaxed);
                out::print_warn(&format!("command failed; {}", describe(path, &d)));
            }
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                error!(file = %path.display(), error = %e, "Claim failed");
                out::print_error(&format!("{}: {e:#}", path.display()));
            }
        }
    });

    let failed = failures.load(Ordering::Relaxed);
    if failed > 0 {
        bail!("{failed} of {} file(s) failed", files.len());
    }
    Ok(())
}

fn claim_one(
    strategy: &ProcessStrategy,
    root: &Path,
    path: &Path,
    exec: &[String],
    cancel: &CancelToken,
) -> Result<FileOutcome> {
    if cancel.is_cancelled() {
        return Ok(FileOutcome::Skipped(SkipReason::Cancelled));
    }
    let file = match FileRef::from_path(root, path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(FileOutcome::Skipped(SkipReason::Vanished));
        }
        Err(e) => return Err(e).with_context(|| format!("stat '{}'", path.display())),
    };

    let tx = match strategy.begin(file, cancel)? {
        Begin::Skipped(reason) => return Ok(FileOutcome::Skipped(reason)),
        Begin::Locked(tx) => tx,
    };

    match run_command(exec, tx.file().absolute_path()) {
        Ok(true) => Ok(FileOutcome::Committed(tx.commit()?)),
        Ok(false) => Ok(FileOutcome::RolledBack(tx.rollback()?)),
        Err(e) => {
            error!(file = %tx.file(), error = %e, "Cannot run command");
            Ok(FileOutcome::RolledBack(tx.rollback()?))
        }
    }
}

/// Run `exec` for `path`: `{}` is replaced by the path, otherwise the path is appended.
/// An empty command always succeeds.
fn run_command(exec: &[String], path: &Path) -> io::Result<bool> {
    let Some((program, rest)) = exec.split_first() else {
        return Ok(true);
    };
    let path_str = path.to_string_lossy();
    let mut substituted = false;
    let args: Vec<String> = rest
        .iter()
        .map(|a| {
            if a.contains("{}") {
                substituted = true;
                a.replace("{}", &path_str)
            } else {
                a.clone()
            }
        })
        .collect();

    let mut cmd = ProcessCommand::new(program);
    cmd.args(&args);
    if !substituted {
        cmd.arg(path);
    }
    let status = cmd.status()?;
    debug!(file = %path.display(), %status, "Command finished");
    Ok(status.success())
}

fn describe(path: &Path, d: &Disposition) -> String {
    match d {
        Disposition::Left(_) => format!("{} (left in place)", path.display()),
        Disposition::Moved(to) => format!("{} -> {}", path.display(), to.absolute_path().display()),
        Disposition::Deleted => format!("{} (deleted)", path.display()),
    }
}
