use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential retry delay with up to 25% jitter, capped. Reset after a
/// successful cycle.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);

        let jitter_range = delay.as_millis() as u64 / 4;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let jitter = Duration::from_millis(seed % jitter_range.max(1));
        (delay + jitter).min(self.max)
    }

    fn base_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }
}
