use std::sync::{Mutex, MutexGuard};

use super::{DEFAULT_MAX_ENTRIES, IdempotentRepository, KeyTable, validate_key};
use crate::errors::RepositoryError;

/// Process-local repository. Sufficient for several workers in one process; use
/// [`FileIdempotentRepository`](super::FileIdempotentRepository) across processes.
#[derive(Debug)]
pub struct MemoryIdempotentRepository {
    table: Mutex<KeyTable>,
}

impl Default for MemoryIdempotentRepository {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryIdempotentRepository {
    pub fn new(max_entries: usize) -> Self {
        Self {
            table: Mutex::new(KeyTable::new(max_entries)),
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> Result<MutexGuard<'_, KeyTable>, RepositoryError> {
        self.table.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

impl IdempotentRepository for MemoryIdempotentRepository {
    fn add(&self, key: &str) -> Result<bool, RepositoryError> {
        validate_key(key)?;
        Ok(self.table()?.add(key))
    }

    fn contains(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.table()?.contains(key))
    }

    fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.table()?.remove(key))
    }

    fn confirm(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.table()?.confirm(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn add_is_true_then_false() {
        let repo = MemoryIdempotentRepository::default();
        assert!(repo.add("/in/a.txt").unwrap());
        assert!(!repo.add("/in/a.txt").unwrap());
        assert!(repo.remove("/in/a.txt").unwrap());
        assert!(repo.add("/in/a.txt").unwrap());
    }

    #[test]
    fn exactly_one_concurrent_winner() {
        let repo = Arc::new(MemoryIdempotentRepository::default());
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if repo.add("shared-key").unwrap() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
