//! Startup sweep of marker files left behind by a crashed consumer.
//!
//! Only markers whose protected file would be accepted by the consumer's filter
//! are touched; markers for files a differently filtered consumer owns are kept.
//! A matching marker is deleted whether or not the protected file still exists.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

use super::MarkerFileLock;
use crate::filter::{PathFilter, ScanScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanLockSweeper {
    suffix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    /// Markers whose target the filter rejected.
    pub kept: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl OrphanLockSweeper {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn for_marker(marker: &MarkerFileLock) -> Self {
        Self::new(marker.suffix())
    }

    pub fn sweep(&self, scope: &ScanScope, filter: &dyn PathFilter) -> SweepReport {
        let mut report = SweepReport::default();
        if self.suffix.is_empty() || !scope.root.is_dir() {
            debug!(root = %scope.root.display(), "Nothing to sweep");
            return report;
        }

        let markers = WalkDir::new(&scope.root)
            .min_depth(1)
            .max_depth(scope.walk_depth())
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file());

        for entry in markers {
            let Some(target) = self.target_of(entry.path()) else {
                continue;
            };
            let relative = target.strip_prefix(&scope.root).unwrap_or(&target);
            if !filter.accepts(relative) {
                trace!(
                    lock = %entry.path().display(),
                    "Keeping lock file outside this consumer's filter"
                );
                report.kept.push(entry.into_path());
                continue;
            }
            warn!(lock = %entry.path().display(), "Deleting orphaned lock file");
            match fs::remove_file(entry.path()) {
                Ok(()) => report.deleted.push(entry.into_path()),
                Err(e) => {
                    warn!(
                        lock = %entry.path().display(),
                        error = %e,
                        "Cannot delete orphaned lock file"
                    );
                    report.failed.push(entry.into_path());
                }
            }
        }
        report
    }

    /// The file a marker protects, or `None` if `path` is not a marker.
    fn target_of(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name().and_then(OsStr::to_str)?;
        let stem = name.strip_suffix(self.suffix.as_str())?;
        if stem.is_empty() {
            return None;
        }
        Some(path.with_file_name(stem))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}
