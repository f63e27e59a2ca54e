//! Cooperative cancellation.
//!
//! A [`CancelToken`] is handed to every blocking acquisition so that shutdown can
//! interrupt a poll sleep immediately instead of waiting out the interval.
//!
//! Notes:
//! - Cancellation is one-way and idempotent.
//! - Clones share state; the binary wires SIGINT/SIGTERM (ctrlc) to `cancel()`.
//! - Waiters use a condvar, so `cancel()` wakes sleepers without polling.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper.
    pub fn cancel(&self) {
        let mut flag = self.flag();
        *flag = true;
        self.shared.wake.notify_all();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Sleep for up to `timeout`. Returns `true` if cancelled before or during the wait.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag();
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            flag = match self.shared.wake.wait_timeout(flag, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    // A panic while holding a bool cannot leave it inconsistent; ignore poisoning.
    fn flag(&self) -> MutexGuard<'_, bool> {
        self.shared
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sleep_runs_full_interval_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_wakes_sleeper_early() {
        let token = CancelToken::new();
        let remote = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }

    #[test]
    fn already_cancelled_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.sleep(Duration::from_secs(10)));
    }
}
