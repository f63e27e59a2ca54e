//! Whole-file rewrites for the key store and template config: write a hidden
//! sibling, fsync it, then rename it over the target.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::sys;

static SEQ: AtomicU64 = AtomicU64::new(0);

/// `.<name>.<pid>.<seq>.tmp` next to `target`; unique within and across processes.
fn sibling_temp(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file_claim".into());
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = format!(".{name}.{}.{seq}.tmp", std::process::id());
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(tmp),
        _ => PathBuf::from(tmp),
    }
}

/// Replace `path` with `contents`. Readers see the old or the new file, never a
/// partial one. The temp file is removed if any step fails.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let tmp = sibling_temp(path);
    let written = sys::create_private(&tmp)
        .and_then(|mut f| {
            f.write_all(contents)?;
            f.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    sys::sync_dir(parent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn temp_names_are_unique_across_threads() {
        let names: HashSet<PathBuf> = (0..32)
            .map(|_| thread::spawn(|| sibling_temp(Path::new("/var/keys.store"))))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert_eq!(names.len(), 32);
        assert!(names.iter().all(|p| p.parent() == Some(Path::new("/var"))));
    }

    #[test]
    fn rewrite_replaces_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("keys.store");
        atomic_write(&target, b"one").unwrap();
        atomic_write(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "leftover temp file");
    }
}
