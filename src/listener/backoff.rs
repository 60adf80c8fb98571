//! Reconnect backoff for the chain data feed

use std::time::Duration;

/// Exponential backoff with a ceiling and an attempt limit.
///
/// Reconnect number n (counting from 1) waits `min(base * 2^n, cap)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay for the next attempt, or `None` once the limit is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map(|d| d.min(self.cap))
            .unwrap_or(self.cap)
    }

    /// Called once a connection is established
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
