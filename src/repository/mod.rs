//! Idempotent repositories: the shared "already claimed" set behind the
//! idempotent read lock.
//!
//! `add` is an atomic compare-and-set: exactly one caller wins for a given key.

mod file;
mod memory;

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::errors::RepositoryError;

pub use file::FileIdempotentRepository;
pub use memory::MemoryIdempotentRepository;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

pub trait IdempotentRepository: Send + Sync + fmt::Debug {
    /// Claim `key`. `Ok(false)` means someone else already holds or consumed it.
    fn add(&self, key: &str) -> Result<bool, RepositoryError>;

    fn contains(&self, key: &str) -> Result<bool, RepositoryError>;

    /// Forget `key` so the file can be claimed again. Returns whether it was present.
    fn remove(&self, key: &str) -> Result<bool, RepositoryError>;

    /// Mark `key` as consumed for good. Returns whether it was present.
    fn confirm(&self, key: &str) -> Result<bool, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyState {
    Claimed,
    Confirmed,
}

impl KeyState {
    fn as_str(self) -> &'static str {
        match self {
            KeyState::Claimed => "claimed",
            KeyState::Confirmed => "confirmed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "claimed" => Some(KeyState::Claimed),
            "confirmed" => Some(KeyState::Confirmed),
            _ => None,
        }
    }
}

/// Insertion-ordered key set. Over capacity, the oldest confirmed keys are evicted;
/// keys still claimed are never evicted.
#[derive(Debug, Default, Clone)]
pub(crate) struct KeyTable {
    states: HashMap<String, KeyState>,
    order: VecDeque<String>,
    max_entries: usize,
}

impl KeyTable {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            states: HashMap::new(),
            order: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub(crate) fn add(&mut self, key: &str) -> bool {
        if self.states.contains_key(key) {
            return false;
        }
        self.states.insert(key.to_string(), KeyState::Claimed);
        self.order.push_back(key.to_string());
        self.evict();
        true
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.states.contains_key(key)
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        if self.states.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    pub(crate) fn confirm(&mut self, key: &str) -> bool {
        match self.states.get_mut(key) {
            Some(state) => {
                *state = KeyState::Confirmed;
                self.evict();
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    fn evict(&mut self) {
        while self.states.len() > self.max_entries {
            let victim = self
                .order
                .iter()
                .position(|k| self.states.get(k) == Some(&KeyState::Confirmed));
            let Some(idx) = victim else { break };
            if let Some(key) = self.order.remove(idx) {
                self.states.remove(&key);
            }
        }
    }

    /// One `<state>\t<key>` line per key, oldest first.
    pub(crate) fn serialize(&self) -> String {
        let mut out = String::new();
        for key in &self.order {
            if let Some(state) = self.states.get(key) {
                out.push_str(state.as_str());
                out.push('\t');
                out.push_str(key);
                out.push('\n');
            }
        }
        out
    }

    /// Inverse of [`serialize`](Self::serialize). Returns the table and the number of
    /// malformed lines that were skipped.
    pub(crate) fn parse(text: &str, max_entries: usize) -> (Self, usize) {
        let mut table = Self::new(max_entries);
        let mut skipped = 0;
        for line in text.lines().filter(|l| !l.is_empty()) {
            let parsed = line
                .split_once('\t')
                .and_then(|(state, key)| KeyState::parse(state).map(|s| (s, key)));
            match parsed {
                Some((state, key)) if !key.is_empty() && !table.states.contains_key(key) => {
                    table.states.insert(key.to_string(), state);
                    table.order.push_back(key.to_string());
                }
                _ => skipped += 1,
            }
        }
        table.evict();
        (table, skipped)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), RepositoryError> {
    if key.is_empty() || key.contains('\n') || key.contains('\r') {
        return Err(RepositoryError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_keeps_claimed_keys() {
        let mut t = KeyTable::new(2);
        assert!(t.add("a"));
        assert!(t.add("b"));
        assert!(t.add("c"));
        // Nothing confirmed yet, so nothing can go.
        assert_eq!(t.len(), 3);
        t.confirm("b");
        assert_eq!(t.len(), 2);
        assert!(!t.contains("b"));
        assert!(t.contains("a") && t.contains("c"));
    }

    #[test]
    fn serialize_then_parse_keeps_order_and_state() {
        let mut t = KeyTable::new(10);
        t.add("/in/a.txt");
        t.add("/in/b\tc.txt");
        t.confirm("/in/a.txt");
        let text = t.serialize();
        assert_eq!(text, "confirmed\t/in/a.txt\nclaimed\t/in/b\tc.txt\n");

        let (back, skipped) = KeyTable::parse(&format!("{text}garbage\n"), 10);
        assert_eq!(skipped, 1);
        assert_eq!(back.serialize(), text);
    }

    #[test]
    fn keys_must_be_single_line() {
        assert!(validate_key("a.txt").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a\nb").is_err());
    }
}
