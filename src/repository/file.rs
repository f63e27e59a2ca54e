//! File-backed repository shared by every process that opens the same store.
//!
//! Store format: one `<state>\t<key>` line per key, oldest first. Each operation
//! takes an exclusive fs2 lock on a sidecar `<store>.lck`, re-reads the store,
//! applies the change and rewrites it atomically, so `add` is a compare-and-set
//! across processes as long as the filesystem honours advisory locks.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::{trace, warn};

use super::{IdempotentRepository, KeyTable, validate_key};
use crate::errors::RepositoryError;
use crate::platform::atomic_write;

#[derive(Debug)]
pub struct FileIdempotentRepository {
    path: PathBuf,
    lock_path: PathBuf,
    max_entries: usize,
    // fs2 locks are per file description; serialize our own threads first.
    local: Mutex<()>,
}

impl FileIdempotentRepository {
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self, RepositoryError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(store_err(parent))?;
        }
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lck");
        let repo = Self {
            lock_path: PathBuf::from(lock_name),
            path,
            max_entries,
            local: Mutex::new(()),
        };
        // Surface unreadable stores at construction rather than on first claim.
        repo.update(|_| ((), false))?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut KeyTable) -> (T, bool),
    ) -> Result<T, RepositoryError> {
        let _local = self.local.lock().map_err(|_| RepositoryError::Poisoned)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(store_err(&self.lock_path))?;
        FileExt::lock_exclusive(&lock_file).map_err(store_err(&self.lock_path))?;

        let result = self.load().and_then(|mut table| {
            let (value, changed) = apply(&mut table);
            if changed {
                atomic_write(&self.path, table.serialize().as_bytes())
                    .map_err(store_err(&self.path))?;
                trace!(
                    store = %self.path.display(),
                    entries = table.len(),
                    "Wrote idempotent store"
                );
            }
            Ok(value)
        });

        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn load(&self) -> Result<KeyTable, RepositoryError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let (table, skipped) = KeyTable::parse(&text, self.max_entries);
                if skipped > 0 {
                    warn!(
                        store = %self.path.display(),
                        skipped,
                        "Ignoring malformed lines in idempotent store"
                    );
                }
                Ok(table)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(KeyTable::new(self.max_entries)),
            Err(e) => Err(RepositoryError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

fn store_err(path: &Path) -> impl FnOnce(io::Error) -> RepositoryError + '_ {
    move |source| RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl IdempotentRepository for FileIdempotentRepository {
    fn add(&self, key: &str) -> Result<bool, RepositoryError> {
        validate_key(key)?;
        self.update(|t| {
            let added = t.add(key);
            (added, added)
        })
    }

    fn contains(&self, key: &str) -> Result<bool, RepositoryError> {
        self.update(|t| (t.contains(key), false))
    }

    fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        self.update(|t| {
            let removed = t.remove(key);
            (removed, removed)
        })
    }

    fn confirm(&self, key: &str) -> Result<bool, RepositoryError> {
        self.update(|t| {
            let confirmed = t.confirm(key);
            (confirmed, confirmed)
        })
    }
}
