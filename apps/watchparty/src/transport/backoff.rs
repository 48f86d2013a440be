use std::time::Duration;

use crate::config::SyncTuning;

/// Exponential reconnect delay with a cap, reset on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    factor: u32,
    cap_ms: u64,
    attempts: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, factor: u32, cap_ms: u64) -> Self {
        Self {
            base_ms,
            factor,
            cap_ms,
            attempts: 0,
        }
    }

    pub fn from_tuning(tuning: &SyncTuning) -> Self {
        Self::new(
            tuning.reconnect_base_ms,
            tuning.reconnect_factor,
            tuning.reconnect_max_ms,
        )
    }

    /// Delay before the next attempt; every call counts as one attempt.
    pub fn next_delay(&mut self) -> Duration {
        let multiplier = (self.factor as u64).saturating_pow(self.attempts);
        let delay = self.base_ms.saturating_mul(multiplier).min(self.cap_ms);
        self.attempts = self.attempts.saturating_add(1);
        Duration::from_millis(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_the_cap() {
        let mut backoff = Backoff::from_tuning(&SyncTuning::default());
        let delays: Vec<u64> = (0..8)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = Backoff::new(1_000, 2, 30_000);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut backoff = Backoff::new(1_000, 2, 30_000);
        for _ in 0..200 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(30_000));
    }
}
