use std::time::Duration;

pub const FIRST_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const RECONNECT_RATE: u32 = 2;
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Exponential delay sequence: `min(max, initial * multiplier^n)` for the
/// n-th consecutive failure.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    multiplier: u32,
    max: Duration,
    attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(FIRST_RECONNECT_DELAY, RECONNECT_RATE, MAX_RECONNECT_DELAY)
    }
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: u32, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
            attempts: 0,
        }
    }

    /// Delay before retry number `n` (zero based).
    pub fn delay(&self, n: u32) -> Duration {
        let factor = self.multiplier.checked_pow(n).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Returns the delay for the current failure and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
