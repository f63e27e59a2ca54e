//! Platform-specific helpers.
//! OS differences are expressed two ways:
//! - pure functions taking an explicit [`TargetOs`] (path syntax, error classification),
//!   so behaviour for another OS can be exercised from any host;
//! - cfg-gated I/O helpers (log file opening, private temp files) behind `sys`.

use std::io;

mod atomic;
#[cfg(unix)]
#[path = "unix.rs"]
mod sys;
#[cfg(not(unix))]
#[path = "windows.rs"]
mod sys;

pub use atomic::atomic_write;
pub use sys::open_log_file_secure_append;

/// Operating-system family whose path and error conventions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Unix,
    Windows,
}

impl TargetOs {
    /// The family this binary was compiled for.
    pub const fn current() -> Self {
        if cfg!(windows) {
            TargetOs::Windows
        } else {
            TargetOs::Unix
        }
    }

    pub const fn separator(self) -> char {
        match self {
            TargetOs::Unix => '/',
            TargetOs::Windows => '\\',
        }
    }
}

/// How an I/O error seen while probing for a lock should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorClass {
    /// The file is gone; skip it.
    Vanished,
    /// Possibly temporary (sharing violation, AV scanner holding a handle, busy).
    Transient,
    /// Retrying cannot help (permission, invalid input, read-only filesystem).
    Permanent,
}

/// Classify an I/O error for retry purposes.
///
/// On Windows, access-denied is what antivirus and office suites produce while they
/// hold a handle, so it is treated as transient there and permanent elsewhere.
pub fn classify_io_error(err: &io::Error, os: TargetOs) -> IoErrorClass {
    match err.kind() {
        io::ErrorKind::NotFound => IoErrorClass::Vanished,
        io::ErrorKind::PermissionDenied => match os {
            TargetOs::Windows => IoErrorClass::Transient,
            TargetOs::Unix => IoErrorClass::Permanent,
        },
        io::ErrorKind::InvalidInput
        | io::ErrorKind::Unsupported
        | io::ErrorKind::ReadOnlyFilesystem
        | io::ErrorKind::IsADirectory => IoErrorClass::Permanent,
        _ => IoErrorClass::Transient,
    }
}

/// Whether `path` is absolute under the conventions of `os`.
///
/// Windows accepts drive-letter paths (`C:\x`, `c:/x`), UNC paths (`\\server\share`)
/// and root-relative paths (`\x`). Unix only accepts a leading `/`.
pub fn is_absolute_path(path: &str, os: TargetOs) -> bool {
    match os {
        TargetOs::Unix => path.starts_with('/'),
        TargetOs::Windows => {
            if path.starts_with("\\\\") || path.starts_with("//") {
                return true;
            }
            if path.starts_with('\\') || path.starts_with('/') {
                return true;
            }
            let bytes = path.as_bytes();
            bytes.len() >= 3
                && bytes[0].is_ascii_alphabetic()
                && bytes[1] == b':'
                && (bytes[2] == b'\\' || bytes[2] == b'/')
        }
    }
}

/// Strip trailing separators, keeping a lone root (`/`, `C:\`) intact.
pub fn strip_trailing_separator(path: &str, os: TargetOs) -> &str {
    let is_sep = |c: char| c == '/' || (os == TargetOs::Windows && c == '\\');
    let trimmed = path.trim_end_matches(is_sep);
    if trimmed.is_empty() {
        return &path[..path.len().min(1)];
    }
    if os == TargetOs::Windows && trimmed.len() == 2 && trimmed.ends_with(':') {
        return &path[..path.len().min(3)];
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_absolute() {
        assert!(is_absolute_path("/in/a.txt", TargetOs::Unix));
        assert!(!is_absolute_path("done", TargetOs::Unix));
        assert!(!is_absolute_path("C:\\done", TargetOs::Unix));
    }

    #[test]
    fn windows_drive_and_unc() {
        assert!(is_absolute_path("C:\\done", TargetOs::Windows));
        assert!(is_absolute_path("d:/done", TargetOs::Windows));
        assert!(is_absolute_path("\\\\server\\share\\x", TargetOs::Windows));
        assert!(is_absolute_path("//server/share", TargetOs::Windows));
        assert!(!is_absolute_path("C:done", TargetOs::Windows));
        assert!(!is_absolute_path(".done", TargetOs::Windows));
    }

    #[test]
    fn trailing_separator() {
        assert_eq!(strip_trailing_separator("done/", TargetOs::Unix), "done");
        assert_eq!(strip_trailing_separator("/", TargetOs::Unix), "/");
        assert_eq!(strip_trailing_separator("done\\", TargetOs::Windows), "done");
        assert_eq!(strip_trailing_separator("done\\", TargetOs::Unix), "done\\");
        assert_eq!(strip_trailing_separator("C:\\", TargetOs::Windows), "C:\\");
    }

    #[test]
    fn permission_denied_depends_on_os() {
        let e = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_io_error(&e, TargetOs::Unix), IoErrorClass::Permanent);
        assert_eq!(classify_io_error(&e, TargetOs::Windows), IoErrorClass::Transient);
    }

    #[test]
    fn not_found_is_vanished() {
        let e = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(classify_io_error(&e, TargetOs::Unix), IoErrorClass::Vanished);
    }

    #[test]
    fn other_errors_are_transient() {
        let e = io::Error::from(io::ErrorKind::WouldBlock);
        assert_eq!(classify_io_error(&e, TargetOs::Unix), IoErrorClass::Transient);
        let e = io::Error::other("sharing violation");
        assert_eq!(classify_io_error(&e, TargetOs::Windows), IoErrorClass::Transient);
    }
}
