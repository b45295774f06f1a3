//! Bounded polling shared by every "wait for X" operation.

use std::thread;
use std::time::{Duration, Instant};

/// Sleeps unless `duration` is zero.
pub fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Keep probing until this much time has elapsed.
    Deadline(Duration),
    /// Probe at most this many times.
    Attempts(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub budget: Budget,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn deadline(timeout: Duration, interval: Duration) -> Self {
        Self {
            budget: Budget::Deadline(timeout),
            interval,
        }
    }

    pub fn attempts(max: u32, interval: Duration) -> Self {
        Self {
            budget: Budget::Attempts(max),
            interval,
        }
    }

    /// Calls `probe` (with the 1-based attempt number) until it yields a
    /// value or the budget runs out.
    ///
    /// With a deadline, exhaustion is reported only once at least the full
    /// timeout has elapsed, and no later than one interval past it (plus the
    /// cost of the last probe).
    pub fn poll<T>(&self, mut probe: impl FnMut(u32) -> Option<T>) -> Option<T> {
        if self.budget == Budget::Attempts(0) {
            return None;
        }
        let start = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(value) = probe(attempt) {
                return Some(value);
            }
            let exhausted = match self.budget {
                Budget::Deadline(timeout) => start.elapsed() >= timeout,
                Budget::Attempts(max) => attempt >= max,
            };
            if exhausted {
                return None;
            }
            pause(self.interval);
        }
    }

    pub fn until(&self, mut condition: impl FnMut() -> bool) -> bool {
        self.poll(|_| condition().then_some(())).is_some()
    }
}
