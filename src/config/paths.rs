//! Default path helpers and symlink checks.
//! OS-appropriate config/log locations via `dirs`, with a $HOME fallback.

use dirs::{config_dir, data_dir};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "file_claim";

fn home_fallback(parts: &[&str]) -> Option<PathBuf> {
    std::env::var_os("HOME").map(|h| parts.iter().fold(PathBuf::from(h), |p, s| p.join(s)))
}

/// OS-appropriate default config path.
pub fn default_config_path() -> Option<PathBuf> {
    match config_dir() {
        Some(base) => Some(base.join(APP_DIR).join("config.xml")),
        None => home_fallback(&[".config", APP_DIR, "config.xml"]),
    }
}

/// OS-appropriate default log file path (data dir).
pub fn default_log_path() -> Option<PathBuf> {
    match data_dir() {
        Some(base) => Some(base.join(APP_DIR).join("file_claim.log")),
        None => home_fallback(&[".local", "share", APP_DIR, "file_claim.log"]),
    }
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        if anc.exists() && fs::symlink_metadata(anc)?.file_type().is_symlink() {
            return Ok(true);
        }
        p = anc.parent();
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_live_under_app_dir() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("file_claim/config.xml"));
        }
        if let Some(p) = default_log_path() {
            assert!(p.ends_with("file_claim/file_claim.log"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn detects_symlinked_ancestor() {
        let dir = tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let real = base.join("real");
        fs::create_dir(&real).unwrap();
        let link = base.join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(path_has_symlink_ancestor(&link.join("config.xml")).unwrap());
        assert!(!path_has_symlink_ancestor(&real.join("config.xml")).unwrap());
    }
}
