//! I/O error description with platform-aware hints.
//!
//! Used by [`ClaimError::Io`](crate::ClaimError) so every surfaced I/O failure names the
//! operation, the path and, where the OS code is recognised, what to check.

use std::io;
use std::path::Path;

/// Hint for a raw OS error code, if we know one.
fn os_hint(code: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        let hint = match code {
            libc::EACCES | libc::EPERM => {
                "permission denied; check ownership and write permissions"
            }
            libc::EXDEV => "cross-filesystem; atomic rename not possible",
            libc::EBUSY => "resource busy; another process may be writing",
            libc::EAGAIN => "lock held by another process",
            libc::ENOENT => "path not found; the file may have been consumed elsewhere",
            libc::EEXIST => "already exists; another consumer may hold the claim",
            libc::ENOSPC => "insufficient space on device",
            libc::EROFS => "read-only filesystem; marker files cannot be created here",
            libc::ENAMETOOLONG => "filename or path too long",
            libc::EMFILE | libc::ENFILE => "file descriptor limit reached",
            libc::ENOLCK => "no locks available; the filesystem may not support byte-range locks",
            _ => return None,
        };
        Some(hint)
    }
    #[cfg(windows)]
    {
        let hint = match code {
            5 => "access denied; a scanner or editor may hold the file",
            17 => "not same device; cross-filesystem move",
            32 => "sharing violation; file is in use",
            33 => "lock violation; another process locked a region of the file",
            2 | 3 => "path not found; the file may have been consumed elsewhere",
            80 | 183 => "already exists; another consumer may hold the claim",
            112 => "insufficient disk space",
            206 => "filename or path too long",
            _ => return None,
        };
        Some(hint)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        None
    }
}

fn kind_hint(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::PermissionDenied => {
            Some("permission denied; check ownership and write permissions")
        }
        io::ErrorKind::NotFound => {
            Some("path not found; the file may have been consumed elsewhere")
        }
        io::ErrorKind::AlreadyExists => Some("already exists; another consumer may hold the claim"),
        io::ErrorKind::WouldBlock => Some("lock held by another process"),
        _ => None,
    }
}

/// `"<op> '<path>': <error> (<hint>) [os code: N]"`.
pub fn describe_io(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{op} '{}': {e}", path.display());
    let hint = match e.raw_os_error() {
        Some(code) => os_hint(code),
        None => kind_hint(e.kind()),
    };
    if let Some(hint) = hint {
        msg.push_str(" (");
        msg.push_str(hint);
        msg.push(')');
    }
    if let Some(code) = e.raw_os_error() {
        msg.push_str(&format!(" [os code: {code}]"));
    }
    msg
}

/// EXDEV / ERROR_NOT_SAME_DEVICE; std has no stable ErrorKind for it.
pub(crate) fn is_cross_device(e: &io::Error) -> bool {
    match e.raw_os_error() {
        #[cfg(unix)]
        Some(code) => code == libc::EXDEV,
        #[cfg(windows)]
        Some(code) => code == 17,
        #[cfg(not(any(unix, windows)))]
        Some(_) => false,
        None => false,
    }
}
