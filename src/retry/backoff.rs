use std::time::Duration;

/// Pause schedule for one analysis run.
///
/// Each pause episode doubles the wait: `base * 2^(round - 1)`. When the computed wait
/// would exceed `ceiling` the sequence starts over at `base`, so with 5 s / 40 s the
/// episodes wait 5, 10, 20, 40, 5, 10, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffController {
    base: Duration,
    ceiling: Duration,
    round: u32,
    current_delay: Duration,
}

impl BackoffController {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling, round: 0, current_delay: base }
    }

    /// Advance to the next pause episode and return how long to wait.
    pub fn next_delay(&mut self) -> Duration {
        self.round += 1;
        let factor = 2u32.saturating_pow(self.round - 1);
        let mut delay = self.base.saturating_mul(factor);
        if delay > self.ceiling {
            self.round = 1;
            delay = self.base;
        }
        self.current_delay = delay;
        delay
    }

    /// Back to base values. Called at the start of a run and when the failure set drains.
    pub fn reset(&mut self) {
        self.round = 0;
        self.current_delay = self.base;
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn five_episodes_wrap_at_ceiling() {
        let mut backoff = BackoffController::new(Duration::from_secs(5), Duration::from_secs(40));
        let delays: Vec<Duration> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, secs(&[5, 10, 20, 40, 5]));
        assert_eq!(backoff.round(), 1);
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = BackoffController::new(Duration::from_secs(5), Duration::from_secs(40));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_delay(), Duration::from_secs(10));

        backoff.reset();
        assert_eq!(backoff.round(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn long_runs_never_overflow() {
        let mut backoff = BackoffController::new(Duration::from_secs(5), Duration::from_secs(40));
        for _ in 0..1_000 {
            assert!(backoff.next_delay() <= Duration::from_secs(40));
        }
    }
}
