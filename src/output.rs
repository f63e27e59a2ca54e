//! User-facing console lines for the CLI. Colored only when stdout is a TTY.
//! Per-file results go to stdout (scriptable); warnings and errors to stderr.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Info,
    Warn,
    Error,
    Success,
    Skip,
}

impl Tone {
    fn label(self) -> &'static str {
        match self {
            Tone::Info => "info:",
            Tone::Warn => "warn:",
            Tone::Error => "error:",
            Tone::Success => "ok:",
            Tone::Skip => "skip:",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Tone::Warn | Tone::Error)
    }
}

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn emit(tone: Tone, msg: &str) {
    let line = if is_tty() {
        let label = tone.label();
        let painted = match tone {
            Tone::Info => label.cyan().bold().to_string(),
            Tone::Warn => label.yellow().bold().to_string(),
            Tone::Error => label.red().bold().to_string(),
            Tone::Success => label.green().bold().to_string(),
            Tone::Skip => label.dimmed().to_string(),
        };
        format!("{painted} {msg}")
    } else {
        format!("{} {msg}", tone.label())
    };
    if tone.to_stderr() {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

pub fn print_info(msg: &str) {
    emit(Tone::Info, msg);
}

pub fn print_warn(msg: &str) {
    emit(Tone::Warn, msg);
}

pub fn print_error(msg: &str) {
    emit(Tone::Error, msg);
}

pub fn print_success(msg: &str) {
    emit(Tone::Success, msg);
}

/// A file that was not claimed (held elsewhere, timed out, ...).
pub fn print_skip(msg: &str) {
    emit(Tone::Skip, msg);
}

/// Plain line without prefix, for output users may script against.
pub fn print_user(msg: &str) {
    println!("{msg}");
}
