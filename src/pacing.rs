// src/pacing.rs
//! Waiting between remote calls.
//!
//! Every sleep in the crate goes through a [`Pacer`] so that tests can
//! record the requested delays instead of sleeping.

use std::sync::Arc;
use std::time::Duration;

/// Blocks the calling thread for a requested duration.
pub trait Pacer: Send + Sync {
    fn pause(&self, delay: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

impl<P: Pacer + ?Sized> Pacer for Arc<P> {
    fn pause(&self, delay: Duration) {
        (**self).pause(delay)
    }
}

/// Upper bound on a server-provided rate-limit wait.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Tracks retry state for one remote call with exponential backoff.
#[derive(Debug)]
pub struct RetryState {
    pub attempt: u32,
    pub max_retries: u32,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
        }
    }

    /// Backoff before the next attempt, or None once retries are used up.
    pub fn next_backoff(&self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        // 1s, 2s, 4s, ... capped
        let secs = 1u64 << self.attempt.min(5);
        Some(Duration::from_secs(secs).min(MAX_BACKOFF))
    }

    /// Wait before retrying a rate-limited call. The server's hint wins
    /// over the backoff schedule.
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Option<Duration> {
        let backoff = self.next_backoff()?;
        Some(retry_after.unwrap_or(backoff).min(MAX_RATE_LIMIT_WAIT))
    }

    pub fn record_failure(&mut self) {
        self.attempt += 1;
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }
}
