//! Poll/timeout loop shared by the polling lock strategies.
//!
//! A [`RetryBudget`] is either bounded (give up after `timeout`) or unbounded (keep
//! trying). Sleeps never overshoot the deadline, so a bounded wait returns
//! `TimedOut` after at least `timeout` and less than `timeout + interval`.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::shutdown::CancelToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    timeout: Option<Duration>,
    interval: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::bounded(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl RetryBudget {
    pub fn bounded(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            interval,
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            timeout: None,
            interval,
        }
    }

    /// Millisecond form used by configuration: a timeout of 0 means unbounded.
    pub fn from_millis(timeout_millis: u64, interval_millis: u64) -> Self {
        let interval = Duration::from_millis(interval_millis);
        if timeout_millis == 0 {
            Self::unbounded(interval)
        } else {
            Self::bounded(Duration::from_millis(timeout_millis), interval)
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.timeout.is_some()
    }
}

/// Result of one attempt inside [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

/// Call `attempt` until it is ready, the budget runs out, or `cancel` fires.
///
/// `attempt` receives the 1-based attempt number. An `Err` from it ends the loop
/// immediately and is returned unchanged.
pub fn poll_until<T, E, F>(
    budget: &RetryBudget,
    cancel: &CancelToken,
    mut attempt: F,
) -> Result<WaitOutcome<T>, E>
where
    F: FnMut(u32) -> Result<Poll<T>, E>,
{
    let started = Instant::now();
    let deadline = budget.timeout.map(|t| started + t);
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            trace!(attempts, "Cancelled while waiting for read lock");
            return Ok(WaitOutcome::Cancelled);
        }

        attempts = attempts.saturating_add(1);
        if let Poll::Ready(value) = attempt(attempts)? {
            trace!(
                attempts,
                waited_ms = started.elapsed().as_millis() as u64,
                "Read lock attempt succeeded"
            );
            return Ok(WaitOutcome::Ready(value));
        }

        let nap = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(timed_out(started, attempts));
                }
                budget.interval.min(deadline - now)
            }
            None => budget.interval,
        };

        if cancel.sleep(nap) {
            trace!(attempts, "Cancelled while waiting for read lock");
            return Ok(WaitOutcome::Cancelled);
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            return Ok(timed_out(started, attempts));
        }
    }
}

fn timed_out<T>(started: Instant, attempts: u32) -> WaitOutcome<T> {
    trace!(
        attempts,
        waited_ms = started.elapsed().as_millis() as u64,
        "Read lock wait timed out"
    );
    WaitOutcome::TimedOut
}
