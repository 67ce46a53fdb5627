//! Restart backoff policy: 1s, 2s, 4s, ... capped at 60s; the attempt
//! counter resets only after 30s of sustained health; more than 10
//! restarts inside a 10-minute window means give up.

use std::time::{Duration, Instant};

/// Cap on a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(60);
/// Sustained healthy uptime required before the counter resets.
const MIN_UPTIME: Duration = Duration::from_secs(30);
/// Restart budget within the window.
const MAX_RESTARTS: usize = 10;
/// Window the budget applies over.
const RESTART_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Per-component restart bookkeeping.
#[derive(Debug)]
pub struct RestartPolicy {
    attempts: Vec<Instant>,
    consecutive: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartPolicy {
    /// Fresh policy with no restart history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
            consecutive: 0,
        }
    }

    /// Record a restart attempt at `now` and return the delay to wait
    /// before it, or `None` when the budget is exhausted.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        self.attempts
            .retain(|attempt| now.duration_since(*attempt) < RESTART_WINDOW);
        if self.attempts.len() >= MAX_RESTARTS {
            return None;
        }

        let exponent = self.consecutive.min(6);
        let delay = Duration::from_secs(1u64 << exponent).min(MAX_DELAY);
        self.consecutive = self.consecutive.saturating_add(1);
        self.attempts.push(now);
        Some(delay)
    }

    /// Report sustained health; resets the consecutive counter after
    /// `MIN_UPTIME` of uptime.
    pub fn note_healthy(&mut self, uptime: Duration) {
        if uptime >= MIN_UPTIME {
            self.consecutive = 0;
        }
    }

    /// Restarts recorded in the current window.
    #[must_use]
    pub fn restarts_in_window(&self) -> usize {
        self.attempts.len()
    }

    /// The restart budget.
    #[must_use]
    pub fn max_restarts() -> usize {
        MAX_RESTARTS
    }
}
