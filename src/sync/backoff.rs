// Logique de retry avec backoff exponentiel

use std::time::Duration;

/// Query cadence once the client has lost its peer: exponential backoff
/// from the base delay up to the cap, reset on the next successful
/// exchange. Unlike a device reconnection there is no attempt limit;
/// the client keeps probing for as long as it runs.
pub struct SyncBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    current_attempt: u32,
}

impl SyncBackoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            current_attempt: 0,
        }
    }

    /// Délai avant la prochaine tentative (backoff exponentiel)
    pub fn next_delay(&mut self) -> Duration {
        // base * 2^attempt, plafonné au maximum
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(self.current_attempt))
            .min(self.max_delay_ms);

        self.current_attempt = self.current_attempt.saturating_add(1);

        Duration::from_millis(delay_ms)
    }

    /// Réinitialise le compteur (après succès)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for SyncBackoff {
    fn default() -> Self {
        Self::new(1000, 30000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let mut backoff = SyncBackoff::new(1000, 30000);

        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(8000));
    }

    #[test]
    fn test_caps_at_max_delay() {
        let mut backoff = SyncBackoff::new(1000, 30000);

        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(30000));
    }

    #[test]
    fn test_reset() {
        let mut backoff = SyncBackoff::new(1000, 30000);

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.current_attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }
}
